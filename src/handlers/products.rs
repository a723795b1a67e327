use axum::{
    extract::State,
    response::IntoResponse,
    Extension,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::common::{
    created_response, required, success_response, validate_input, JsonBody, QueryParams,
};
use crate::{
    auth::AuthUser, errors::ServiceError, services::catalog::NewProduct, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(required, length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(required)]
    #[schema(value_type = Option<String>, example = "19.99")]
    pub price: Option<Decimal>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LowStockQuery {
    /// Report products whose stock is strictly below this value
    pub threshold: Option<i64>,
}

/// List the product catalog
#[utoipa::path(
    get,
    path = "/api/v1/products",
    responses(
        (status = 200, description = "Products returned"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn list_products(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let products = state.services.catalog.list_products().await?;
    Ok(success_response(products))
}

/// Add a product to the global catalog
#[utoipa::path(
    post,
    path = "/api/v1/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created"),
        (status = 400, description = "Name and price are required", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(payload): JsonBody<CreateProductRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let product = state
        .services
        .catalog
        .create_product(
            user.actor(),
            NewProduct {
                name: required(payload.name, "name")?,
                description: payload.description,
                price: required(payload.price, "price")?,
            },
        )
        .await?;

    Ok(created_response(product))
}

/// Products below a stock threshold in the caller's store. Served from a
/// short-lived cache, so recent movements may not be reflected yet.
#[utoipa::path(
    get,
    path = "/api/v1/products/low-stock",
    params(LowStockQuery),
    responses(
        (status = 200, description = "Low-stock report", body = [crate::services::low_stock::LowStockItem]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "No store assigned", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn get_low_stock(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    QueryParams(query): QueryParams<LowStockQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let scope = user.store_scope()?;
    let threshold = query
        .threshold
        .unwrap_or(state.config.cache.default_threshold);

    let items = state
        .services
        .low_stock
        .get_low_stock(scope.store_id, threshold)
        .await?;
    Ok(success_response(items))
}
