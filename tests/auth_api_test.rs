mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::{json, Value};

async fn register(app: &TestApp, body: Value) -> (StatusCode, Value) {
    app.request(Method::POST, "/auth/register", None, Some(body))
        .await
}

async fn login(app: &TestApp, username: &str, password: &str) -> (StatusCode, Value) {
    app.request(
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await
}

#[tokio::test]
async fn registered_user_can_log_in_and_use_the_api() {
    let app = TestApp::new().await;
    let store = app.seed_store("Downtown").await;
    let product = app.seed_product("Widget").await;

    let (status, body) = register(
        &app,
        json!({ "username": "clerk", "password": "correct horse", "store_id": store }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["user_id"].as_i64().is_some());

    let (status, token) = login(&app, "clerk", "correct horse").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(token["token_type"], "Bearer");
    let access_token = token["access_token"].as_str().expect("token").to_string();

    let (status, body) = app.record(&access_token, product, "stock_in", 2).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["store_id"], store);
}

#[tokio::test]
async fn duplicate_usernames_conflict() {
    let app = TestApp::new().await;

    let (status, _) = register(&app, json!({ "username": "clerk", "password": "password-1" })).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) =
        register(&app, json!({ "username": "clerk", "password": "password-2" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "AUTH_USERNAME_TAKEN");
}

#[tokio::test]
async fn registration_validates_its_input() {
    let app = TestApp::new().await;

    let (status, _) = register(&app, json!({ "username": "clerk" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = register(&app, json!({ "username": "clerk", "password": "short" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = register(
        &app,
        json!({ "username": "clerk", "password": "long enough", "store_id": 777 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "AUTH_INVALID_REQUEST");
}

#[tokio::test]
async fn wrong_credentials_are_rejected_uniformly() {
    let app = TestApp::new().await;
    register(&app, json!({ "username": "clerk", "password": "correct horse" })).await;

    let (wrong_password, body_a) = login(&app, "clerk", "battery staple").await;
    let (unknown_user, body_b) = login(&app, "nobody", "correct horse").await;

    assert_eq!(wrong_password, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user, StatusCode::UNAUTHORIZED);
    assert_eq!(body_a, body_b);
}

#[tokio::test]
async fn user_without_store_logs_in_but_cannot_touch_the_ledger() {
    let app = TestApp::new().await;
    register(&app, json!({ "username": "auditor", "password": "read only please" })).await;

    let (status, token) = login(&app, "auditor", "read only please").await;
    assert_eq!(status, StatusCode::OK);
    let access_token = token["access_token"].as_str().expect("token");

    let (status, _) = app.get("/api/v1/movements", access_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
