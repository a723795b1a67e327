//! Stockflow API Library
//!
//! Multi-store inventory tracking over a ledger of stock movements. Current
//! stock is always derived from the ledger; writes that would drive it
//! negative are rejected inside the transaction that would perform them.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, put},
    Extension, Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::{AuthProvider, AuthRouterExt, AuthService};
use crate::cache::CacheBackend;
use crate::events::AuditNotifier;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub cache: Arc<dyn CacheBackend>,
    pub audit: AuditNotifier,
    pub auth: Arc<AuthService>,
    pub services: AppServices,
}

/// Services used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub movements: services::movements::MovementService,
    pub low_stock: services::low_stock::LowStockService,
    pub catalog: services::catalog::CatalogService,
}

impl AppState {
    /// Wires every service from explicitly constructed clients.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        cache: Arc<dyn CacheBackend>,
        audit: AuditNotifier,
    ) -> Self {
        let auth = Arc::new(AuthService::new(
            auth::AuthConfig::from_app_config(&config),
            db.clone(),
        ));

        let services = AppServices {
            movements: services::movements::MovementService::new(db.clone(), audit.clone()),
            low_stock: services::low_stock::LowStockService::new(
                db.clone(),
                cache.clone(),
                config.cache.low_stock_ttl(),
            ),
            catalog: services::catalog::CatalogService::new(db.clone(), audit.clone()),
        };

        Self {
            db,
            config,
            cache,
            audit,
            auth,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Versioned API. Everything except health and status requires a bearer token.
pub fn api_v1_routes() -> Router<AppState> {
    let ledger = Router::new()
        .route(
            "/movements",
            get(handlers::movements::list_movements).post(handlers::movements::record_movement),
        )
        .route(
            "/movements/:id",
            put(handlers::movements::update_movement).delete(handlers::movements::delete_movement),
        )
        .route(
            "/products",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
        .route("/products/low-stock", get(handlers::products::get_low_stock))
        .route(
            "/stores",
            get(handlers::stores::list_stores).post(handlers::stores::create_store),
        )
        .route("/stores/:id", get(handlers::stores::get_store))
        .with_auth();

    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(api_status))
        .merge(ledger)
}

/// Full application router without transport concerns (CORS, compression),
/// shared by the server binary and the integration tests.
pub fn app_router(state: AppState) -> Router {
    let provider: Arc<dyn AuthProvider> = state.auth.clone();

    Router::new()
        .nest("/api/v1", api_v1_routes())
        .nest("/auth", auth::auth_routes().with_state(state.auth.clone()))
        .merge(openapi::swagger_ui())
        .layer(crate::tracing::configure_http_tracing())
        .layer(Extension(provider))
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "stockflow-api",
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.config.environment,
    });

    Json(ApiResponse::success(status_data))
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(e) => {
            ::tracing::warn!(error = %e, "database health probe failed");
            "unhealthy"
        }
    };

    // The cache only degrades the low-stock report, so it never fails health.
    let cache_status = match state.cache.exists("health:probe").await {
        Ok(_) => "healthy",
        Err(e) => {
            ::tracing::warn!(error = %e, "cache health probe failed");
            "degraded"
        }
    };

    let status = if db_status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let health_data = json!({
        "status": if status == StatusCode::OK { "healthy" } else { "unhealthy" },
        "checks": {
            "database": db_status,
            "cache": cache_status,
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    (status, Json(ApiResponse::success(health_data)))
}

pub mod prelude {
    pub use crate::auth::{AuthProvider, AuthUser};
    pub use crate::errors::*;
    pub use crate::events::{AuditAction, AuditEvent, AuditNotifier};
    pub use crate::services::ledger::MovementType;
    pub use crate::services::{Actor, StoreScope};
    pub use crate::{app_router, AppState};
}
