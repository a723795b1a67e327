mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use common::{TestApp, TestOptions};
use sea_orm::{EntityTrait, QueryOrder};
use serde_json::json;
use stockflow_api::entities::audit_log;
use stockflow_api::events::{AuditEvent, AuditSink, AuditSinkError};

#[derive(Default)]
struct BrokenSink {
    attempts: AtomicUsize,
}

#[async_trait]
impl AuditSink for BrokenSink {
    async fn append(&self, _event: &AuditEvent) -> Result<(), AuditSinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AuditSinkError::Unavailable("audit store offline".to_string()))
    }
}

async fn wait_for_audit_rows(app: &TestApp, expected: usize) -> Vec<audit_log::Model> {
    for _ in 0..50 {
        let rows = audit_log::Entity::find()
            .order_by_asc(audit_log::Column::Id)
            .all(app.db.as_ref())
            .await
            .expect("audit rows");
        if rows.len() >= expected {
            return rows;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {expected} audit rows");
}

#[tokio::test]
async fn ledger_changes_are_written_to_the_audit_trail() {
    let app = TestApp::new().await;
    let store = app.seed_store("Downtown").await;
    let product = app.seed_product("Widget").await;
    let token = app.token_for(Some(store)).await;

    let (_, stock_in) = app.record(&token, product, "stock_in", 10).await;
    let id = stock_in["data"]["id"].as_i64().expect("id");
    let uri = format!("/api/v1/movements/{}", id);
    app.request(Method::PUT, &uri, Some(&token), Some(json!({ "quantity": 12 })))
        .await;
    app.request(Method::DELETE, &uri, Some(&token), None).await;

    let rows = wait_for_audit_rows(&app, 3).await;
    let actions: Vec<&str> = rows.iter().map(|row| row.action.as_str()).collect();
    assert_eq!(
        actions,
        vec!["add_stock_movement", "update_stock", "delete_movement"]
    );
    assert!(rows.iter().all(|row| row.store_id == Some(store)));
    assert_eq!(
        rows[0].details,
        format!(
            "Product ID: {}, Type: stock_in, Qty: 10, Movement ID: {}",
            product, id
        )
    );
    assert_eq!(
        rows[1].details,
        format!("Updated movement ID: {}, New Quantity: 12", id)
    );
    assert_eq!(
        rows[2].details,
        format!("Deleted movement ID: {}, Quantity before deletion: 12", id)
    );
}

#[tokio::test]
async fn rejected_changes_are_not_audited() {
    let app = TestApp::new().await;
    let store = app.seed_store("Downtown").await;
    let product = app.seed_product("Widget").await;
    let token = app.token_for(Some(store)).await;

    let (status, _) = app.record(&token, product, "sale", 1).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    app.record(&token, product, "stock_in", 1).await;

    let rows = wait_for_audit_rows(&app, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let rows_after = wait_for_audit_rows(&app, 1).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows_after.len(), 1);
    assert_eq!(rows_after[0].action, "add_stock_movement");
}

#[tokio::test]
async fn catalog_writes_are_audited() {
    let app = TestApp::new().await;
    let store = app.seed_store("Downtown").await;
    let token = app.token_for(Some(store)).await;

    app.post(
        "/api/v1/products",
        &token,
        json!({ "name": "Lamp", "price": "24.50" }),
    )
    .await;
    app.post("/api/v1/stores", &token, json!({ "name": "Uptown" }))
        .await;

    let rows = wait_for_audit_rows(&app, 2).await;
    assert_eq!(rows[0].action, "create_product");
    assert!(rows[0]
        .details
        .starts_with("Created product: Name = Lamp, Price = 24.5"));
    assert_eq!(rows[1].action, "create_store");
    assert_eq!(rows[1].details, "Created store: Name = Uptown, Location = N/A");
}

#[tokio::test]
async fn audit_failures_never_change_the_response() {
    let sink = Arc::new(BrokenSink::default());
    let app = TestApp::with_options(TestOptions {
        audit_sink: Some(sink.clone() as Arc<dyn AuditSink>),
        ..Default::default()
    })
    .await;
    let store = app.seed_store("Downtown").await;
    let product = app.seed_product("Widget").await;
    let token = app.token_for(Some(store)).await;

    let (status, body) = app.record(&token, product, "stock_in", 6).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["stock"], 6);
    assert_eq!(app.stock(store, product).await, 6);

    // The worker retries and then gives up; the ledger is untouched.
    for _ in 0..50 {
        if sink.attempts.load(Ordering::SeqCst) >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(app.stock(store, product).await, 6);
}
