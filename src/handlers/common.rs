use crate::errors::ServiceError;
use crate::ApiResponse;
use async_trait::async_trait;
use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use validator::Validate;

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input
        .validate()
        .map_err(|e| ServiceError::ValidationError(format!("Validation failed: {}", e)))
}

/// Unwraps a field that `validate_input` has already checked is present.
pub fn required<T>(value: Option<T>, field: &str) -> Result<T, ServiceError> {
    value.ok_or_else(|| ServiceError::ValidationError(format!("{} is required", field)))
}

/// JSON body extractor. Unreadable bodies, wrong field types and a missing
/// `Content-Type` all come back as a 400 `ErrorResponse`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ServiceError::ValidationError(format!(
                "Invalid request body: {}",
                rejection.body_text()
            ))),
        }
    }
}

/// Query string extractor with the same error mapping as [`JsonBody`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(ServiceError::ValidationError(format!(
                "Invalid query string: {}",
                rejection.body_text()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::{body::Body, http::header};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        quantity: Option<i32>,
    }

    fn json_request(content_type: Option<&str>, body: &'static str) -> Request {
        let mut builder = axum::http::Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn well_formed_bodies_are_extracted() {
        let request = json_request(Some("application/json"), r#"{"quantity":4}"#);
        let JsonBody(payload) = JsonBody::<Payload>::from_request(request, &()).await.unwrap();
        assert_eq!(payload.quantity, Some(4));
    }

    #[tokio::test]
    async fn malformed_bodies_become_validation_errors() {
        for (content_type, body) in [
            (Some("application/json"), r#"{"quantity":"5"}"#),
            (Some("application/json"), r#"{"quantity":2.5}"#),
            (Some("application/json"), r#"{"quantity":3000000000}"#),
            (Some("application/json"), "{not json"),
            (None, r#"{"quantity":4}"#),
        ] {
            let result = JsonBody::<Payload>::from_request(json_request(content_type, body), &()).await;
            assert_matches!(
                result,
                Err(ServiceError::ValidationError(msg)) if msg.starts_with("Invalid request body")
            );
        }
    }

    #[tokio::test]
    async fn malformed_query_strings_become_validation_errors() {
        let (mut parts, _) = axum::http::Request::builder()
            .uri("/?quantity=abc")
            .body(())
            .unwrap()
            .into_parts();
        let result = QueryParams::<Payload>::from_request_parts(&mut parts, &()).await;
        assert_matches!(
            result,
            Err(ServiceError::ValidationError(msg)) if msg.starts_with("Invalid query string")
        );
    }
}
