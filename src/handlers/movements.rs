use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::common::{
    created_response, required, success_response, validate_input, JsonBody, QueryParams,
};
use crate::{
    auth::AuthUser,
    entities::stock_movement,
    errors::ServiceError,
    services::{
        ledger::MovementType,
        movements::{MovementFilter, MovementOutcome, RecordMovement},
    },
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecordMovementRequest {
    #[validate(required)]
    pub product_id: Option<i32>,
    /// `stock_in`, `sale`, `manual_removal`; any other value removes stock
    #[serde(rename = "type")]
    #[validate(required, length(min = 1, max = 32))]
    #[schema(example = "stock_in")]
    pub movement_type: Option<String>,
    #[validate(required, range(min = 1))]
    pub quantity: Option<i32>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateMovementRequest {
    #[validate(required, range(min = 1))]
    pub quantity: Option<i32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MovementQuery {
    /// Inclusive lower bound (RFC 3339, or a plain date meaning its midnight UTC)
    #[serde(default, deserialize_with = "time_bound")]
    #[param(value_type = Option<String>)]
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound (RFC 3339, or a plain date meaning its midnight UTC)
    #[serde(default, deserialize_with = "time_bound")]
    #[param(value_type = Option<String>)]
    pub end: Option<DateTime<Utc>>,
    pub product_id: Option<i32>,
}

fn parse_time_bound(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| format!("`{}` is neither an RFC 3339 timestamp nor a YYYY-MM-DD date", raw))
}

fn time_bound<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| parse_time_bound(&raw).map_err(serde::de::Error::custom))
        .transpose()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MovementResponse {
    pub id: i32,
    pub store_id: i32,
    pub product_id: i32,
    #[serde(rename = "type")]
    pub movement_type: String,
    pub quantity: i32,
    pub recorded_at: DateTime<Utc>,
}

impl From<stock_movement::Model> for MovementResponse {
    fn from(model: stock_movement::Model) -> Self {
        Self {
            id: model.id,
            store_id: model.store_id,
            product_id: model.product_id,
            movement_type: model.movement_type,
            quantity: model.quantity,
            recorded_at: model.recorded_at,
        }
    }
}

/// A movement write together with the derived stock it left behind.
#[derive(Debug, Serialize, ToSchema)]
pub struct MovementChangeResponse {
    #[serde(flatten)]
    pub movement: MovementResponse,
    pub stock: i64,
}

impl From<MovementOutcome> for MovementChangeResponse {
    fn from(outcome: MovementOutcome) -> Self {
        Self {
            movement: outcome.movement.into(),
            stock: outcome.stock_after,
        }
    }
}

/// List stock movements of the caller's store
#[utoipa::path(
    get,
    path = "/api/v1/movements",
    params(MovementQuery),
    responses(
        (status = 200, description = "Movements returned", body = [MovementResponse]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "No store assigned", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "movements"
)]
pub async fn list_movements(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    QueryParams(query): QueryParams<MovementQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let scope = user.store_scope()?;
    let movements = state
        .services
        .movements
        .list_movements(
            scope.store_id,
            MovementFilter {
                start: query.start,
                end: query.end,
                product_id: query.product_id,
            },
        )
        .await?;

    let body: Vec<MovementResponse> = movements.into_iter().map(Into::into).collect();
    Ok(success_response(body))
}

/// Record a stock movement in the caller's store
#[utoipa::path(
    post,
    path = "/api/v1/movements",
    request_body = RecordMovementRequest,
    responses(
        (status = 201, description = "Movement recorded", body = MovementChangeResponse),
        (status = 400, description = "Missing fields or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "No store assigned", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "movements"
)]
pub async fn record_movement(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(payload): JsonBody<RecordMovementRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let scope = user.store_scope()?;
    validate_input(&payload)?;

    let input = RecordMovement {
        product_id: required(payload.product_id, "product_id")?,
        kind: MovementType::parse(&required(payload.movement_type, "type")?),
        quantity: required(payload.quantity, "quantity")?,
    };

    let outcome = state.services.movements.record_movement(scope, input).await?;
    Ok(created_response(MovementChangeResponse::from(outcome)))
}

/// Change the quantity of a movement
#[utoipa::path(
    put,
    path = "/api/v1/movements/{id}",
    params(("id" = i32, Path, description = "Movement ID")),
    request_body = UpdateMovementRequest,
    responses(
        (status = 200, description = "Movement updated", body = MovementChangeResponse),
        (status = 400, description = "Missing quantity or would cause negative stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Movement not found in this store", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "movements"
)]
pub async fn update_movement(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
    JsonBody(payload): JsonBody<UpdateMovementRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let scope = user.store_scope()?;
    validate_input(&payload)?;
    let quantity = required(payload.quantity, "quantity")?;

    let outcome = state
        .services
        .movements
        .update_movement_quantity(scope, id, quantity)
        .await?;
    Ok(success_response(MovementChangeResponse::from(outcome)))
}

/// Delete a movement
#[utoipa::path(
    delete,
    path = "/api/v1/movements/{id}",
    params(("id" = i32, Path, description = "Movement ID")),
    responses(
        (status = 200, description = "Movement deleted", body = MovementChangeResponse),
        (status = 400, description = "Would cause negative stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Movement not found in this store", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "movements"
)]
pub async fn delete_movement(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    let scope = user.store_scope()?;
    let outcome = state.services.movements.delete_movement(scope, id).await?;
    Ok(success_response(MovementChangeResponse::from(outcome)))
}
