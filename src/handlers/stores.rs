use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use super::common::{created_response, required, success_response, validate_input, JsonBody};
use crate::{auth::AuthUser, errors::ServiceError, services::catalog::NewStore, AppState};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateStoreRequest {
    #[validate(required, length(min = 1, max = 255))]
    pub name: Option<String>,
    pub location: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/stores",
    request_body = CreateStoreRequest,
    responses(
        (status = 201, description = "Store created"),
        (status = 400, description = "Store name is required", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "stores"
)]
pub async fn create_store(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(payload): JsonBody<CreateStoreRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let store = state
        .services
        .catalog
        .create_store(
            user.actor(),
            NewStore {
                name: required(payload.name, "name")?,
                location: payload.location,
            },
        )
        .await?;

    Ok(created_response(store))
}

#[utoipa::path(
    get,
    path = "/api/v1/stores",
    responses((status = 200, description = "Stores returned")),
    security(("bearer_auth" = [])),
    tag = "stores"
)]
pub async fn list_stores(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let stores = state.services.catalog.list_stores().await?;
    Ok(success_response(stores))
}

#[utoipa::path(
    get,
    path = "/api/v1/stores/{id}",
    params(("id" = i32, Path, description = "Store ID")),
    responses(
        (status = 200, description = "Store returned"),
        (status = 404, description = "Store not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "stores"
)]
pub async fn get_store(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    let store = state.services.catalog.get_store(id).await?;
    Ok(success_response(store))
}
