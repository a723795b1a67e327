#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::Value;
use stockflow_api::{
    app_router,
    cache::{CacheBackend, CacheError, InMemoryCache},
    config::AppConfig,
    db,
    entities::{product, store, user},
    events::{self, AuditNotifier, AuditSink, DbAuditSink},
    middleware_helpers::RetryConfig,
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str =
    "k3Jx9QmZ2vLr8TnW4pYs6HbD1fGc7AeU0oIiKlMnBvCxZaSdFgHjQwErTyUiOpLk";

/// Knobs for the collaborators a test wants to replace.
pub struct TestOptions {
    pub cache: Option<Arc<dyn CacheBackend>>,
    pub audit_sink: Option<Arc<dyn AuditSink>>,
    pub low_stock_ttl_secs: u64,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            cache: None,
            audit_sink: None,
            low_stock_ttl_secs: 600,
        }
    }
}

/// Application wired against a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    _db_dir: TempDir,
    _audit_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_options(TestOptions::default()).await
    }

    pub async fn with_options(options: TestOptions) -> Self {
        let db_dir = tempfile::tempdir().expect("temp dir");
        let db_path = db_dir.path().join("stockflow_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "redis://127.0.0.1:6379".to_string(),
            TEST_JWT_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.cache.cache_type = "in-memory".to_string();
        cfg.cache.low_stock_ttl_secs = options.low_stock_ttl_secs;
        cfg.db_max_connections = 4;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let cache = options
            .cache
            .unwrap_or_else(|| Arc::new(InMemoryCache::new()) as Arc<dyn CacheBackend>);
        let sink = options
            .audit_sink
            .unwrap_or_else(|| Arc::new(DbAuditSink::new(db_arc.clone())) as Arc<dyn AuditSink>);

        let (audit, audit_rx) = AuditNotifier::channel(256);
        let audit_task = tokio::spawn(events::process_audit_events(
            audit_rx,
            sink,
            fast_retry(),
        ));

        let state = AppState::new(db_arc.clone(), cfg, cache, audit);
        let router = app_router(state.clone());

        Self {
            router,
            state,
            db: db_arc,
            _db_dir: db_dir,
            _audit_task: audit_task,
        }
    }

    pub async fn seed_store(&self, name: &str) -> i32 {
        store::ActiveModel {
            name: Set(name.to_string()),
            location: Set(Some("Test Street 1".to_string())),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .expect("seed store")
        .id
    }

    pub async fn seed_product(&self, name: &str) -> i32 {
        product::ActiveModel {
            name: Set(name.to_string()),
            description: Set(None),
            price: Set(Decimal::new(999, 2)),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .expect("seed product")
        .id
    }

    /// Persists a user bound to `store_id` and returns a bearer token for it.
    pub async fn token_for(&self, store_id: Option<i32>) -> String {
        let account = user::ActiveModel {
            username: Set(format!("user-{}", Uuid::new_v4())),
            password_hash: Set("not-a-real-hash".to_string()),
            store_id: Set(store_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .expect("seed user");

        self.state
            .auth
            .generate_token(&account)
            .expect("token")
            .access_token
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        match body {
            Some(json) => {
                self.request_raw(method, uri, token, Some("application/json"), json.to_string())
                    .await
            }
            None => self.request_raw(method, uri, token, None, String::new()).await,
        }
    }

    /// Sends `body` verbatim, with whatever content type the caller chooses.
    pub async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        content_type: Option<&str>,
        body: String,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let request = builder.body(Body::from(body)).expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn record(
        &self,
        token: &str,
        product_id: i32,
        kind: &str,
        quantity: i32,
    ) -> (StatusCode, Value) {
        self.post(
            "/api/v1/movements",
            token,
            serde_json::json!({ "product_id": product_id, "type": kind, "quantity": quantity }),
        )
        .await
    }

    pub async fn stock(&self, store_id: i32, product_id: i32) -> i64 {
        self.state
            .services
            .movements
            .current_stock(store_id, product_id)
            .await
            .expect("derive stock")
    }
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_factor: 2.0,
    }
}

/// Cache whose every operation fails, as when Redis is unreachable.
pub struct UnavailableCache;

#[async_trait]
impl CacheBackend for UnavailableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::OperationFailed("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<(), CacheError> {
        Err(CacheError::OperationFailed("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::OperationFailed("connection refused".to_string()))
    }

    async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::OperationFailed("connection refused".to_string()))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        Err(CacheError::OperationFailed("connection refused".to_string()))
    }
}
