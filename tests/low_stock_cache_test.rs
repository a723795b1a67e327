mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use common::{TestApp, TestOptions, UnavailableCache};
use serde_json::Value;
use stockflow_api::cache::CacheBackend;
use stockflow_api::services::low_stock::cache_key;

fn stock_of(report: &Value, product_id: i32) -> Option<i64> {
    report["data"]
        .as_array()?
        .iter()
        .find(|item| item["product_id"] == product_id)
        .and_then(|item| item["stock"].as_i64())
}

#[tokio::test]
async fn products_without_movements_count_as_zero() {
    let app = TestApp::new().await;
    let store = app.seed_store("Downtown").await;
    let untouched = app.seed_product("Untouched").await;
    let stocked = app.seed_product("Stocked").await;
    let token = app.token_for(Some(store)).await;
    app.record(&token, stocked, "stock_in", 50).await;

    let (status, report) = app
        .get("/api/v1/products/low-stock?threshold=10", &token)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock_of(&report, untouched), Some(0));
    assert_eq!(stock_of(&report, stocked), None);
}

#[tokio::test]
async fn threshold_comparison_is_strict() {
    let app = TestApp::new().await;
    let store = app.seed_store("Downtown").await;
    let product = app.seed_product("Widget").await;
    let token = app.token_for(Some(store)).await;
    app.record(&token, product, "stock_in", 10).await;

    let (_, at_threshold) = app
        .get("/api/v1/products/low-stock?threshold=10", &token)
        .await;
    assert_eq!(stock_of(&at_threshold, product), None);

    let (_, above) = app
        .get("/api/v1/products/low-stock?threshold=11", &token)
        .await;
    assert_eq!(stock_of(&above, product), Some(10));
}

#[tokio::test]
async fn report_is_served_from_cache_until_it_expires() {
    let app = TestApp::with_options(TestOptions {
        low_stock_ttl_secs: 1,
        ..Default::default()
    })
    .await;
    let store = app.seed_store("Downtown").await;
    let product = app.seed_product("Widget").await;
    let token = app.token_for(Some(store)).await;
    app.record(&token, product, "stock_in", 3).await;

    let (_, first) = app
        .get("/api/v1/products/low-stock?threshold=10", &token)
        .await;
    assert_eq!(stock_of(&first, product), Some(3));

    // Writes do not invalidate the cached report.
    app.record(&token, product, "stock_in", 2).await;
    let (_, cached) = app
        .get("/api/v1/products/low-stock?threshold=10", &token)
        .await;
    assert_eq!(stock_of(&cached, product), Some(3));

    tokio::time::sleep(Duration::from_millis(1_200)).await;

    let (_, refreshed) = app
        .get("/api/v1/products/low-stock?threshold=10", &token)
        .await;
    assert_eq!(stock_of(&refreshed, product), Some(5));
}

#[tokio::test]
async fn cache_entries_are_keyed_per_store_and_threshold() {
    let app = TestApp::new().await;
    let north = app.seed_store("North").await;
    let south = app.seed_store("South").await;
    let product = app.seed_product("Widget").await;
    let north_token = app.token_for(Some(north)).await;
    let south_token = app.token_for(Some(south)).await;
    app.record(&north_token, product, "stock_in", 8).await;

    let (_, north_report) = app
        .get("/api/v1/products/low-stock?threshold=10", &north_token)
        .await;
    let (_, south_report) = app
        .get("/api/v1/products/low-stock?threshold=10", &south_token)
        .await;
    assert_eq!(stock_of(&north_report, product), Some(8));
    assert_eq!(stock_of(&south_report, product), Some(0));

    // A different threshold misses the cache and sees the latest ledger.
    app.record(&north_token, product, "stock_in", 1).await;
    let (_, other_threshold) = app
        .get("/api/v1/products/low-stock?threshold=20", &north_token)
        .await;
    assert_eq!(stock_of(&other_threshold, product), Some(9));

    let cache = app.state.cache.clone();
    assert!(cache.exists(&cache_key(north, 10)).await.expect("cache"));
    assert!(cache.exists(&cache_key(south, 10)).await.expect("cache"));
    assert!(cache.exists(&cache_key(north, 20)).await.expect("cache"));
    assert!(!cache.exists(&cache_key(south, 20)).await.expect("cache"));
}

#[tokio::test]
async fn default_threshold_applies_when_none_is_given() {
    let app = TestApp::new().await;
    let store = app.seed_store("Downtown").await;
    let product = app.seed_product("Widget").await;
    let token = app.token_for(Some(store)).await;
    let default_threshold = app.state.config.cache.default_threshold;

    let (status, report) = app.get("/api/v1/products/low-stock", &token).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock_of(&report, product), Some(0));
    assert!(app
        .state
        .cache
        .exists(&cache_key(store, default_threshold))
        .await
        .expect("cache"));
}

#[tokio::test]
async fn unavailable_cache_falls_back_to_the_ledger() {
    let app = TestApp::with_options(TestOptions {
        cache: Some(Arc::new(UnavailableCache) as Arc<dyn CacheBackend>),
        ..Default::default()
    })
    .await;
    let store = app.seed_store("Downtown").await;
    let product = app.seed_product("Widget").await;
    let token = app.token_for(Some(store)).await;
    app.record(&token, product, "stock_in", 4).await;

    let (status, report) = app
        .get("/api/v1/products/low-stock?threshold=10", &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock_of(&report, product), Some(4));

    // Nothing is cached, so every read is fresh.
    app.record(&token, product, "sale", 1).await;
    let (_, again) = app
        .get("/api/v1/products/low-stock?threshold=10", &token)
        .await;
    assert_eq!(stock_of(&again, product), Some(3));

    let (status, health) = app
        .request(axum::http::Method::GET, "/api/v1/health", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["data"]["checks"]["cache"], "degraded");
}
