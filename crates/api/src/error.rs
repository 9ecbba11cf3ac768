//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OrderError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Order engine error.
    Order(OrderError),
    /// Record management error.
    Store(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Order(err) => (order_status(&err), err.kind(), err.to_string()),
            ApiError::Store(err) => store_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, kind, "request failed");
        }

        let body = serde_json::json!({ "error": message, "kind": kind });
        (status, axum::Json(body)).into_response()
    }
}

fn order_status(err: &OrderError) -> StatusCode {
    match err {
        OrderError::EmptyOrder
        | OrderError::ProductUnavailable { .. }
        | OrderError::InvalidQuantity { .. }
        | OrderError::OrderTooLarge
        | OrderError::CouponInvalid { .. }
        | OrderError::CouponExpired { .. }
        | OrderError::CouponAlreadyUsed { .. }
        | OrderError::CouponExhausted { .. }
        | OrderError::InsufficientPoints { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        OrderError::InvalidTransition { .. } | OrderError::Conflict(_) => StatusCode::CONFLICT,
        OrderError::NotFound(_) => StatusCode::NOT_FOUND,
        OrderError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        OrderError::InvalidHistory(_)
        | OrderError::Serialization(_)
        | OrderError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, &'static str, String) {
    match &err {
        StoreError::InvalidRecord(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_RECORD", err.to_string())
        }
        _ if err.is_transient() => {
            (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", err.to_string())
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE", err.to_string()),
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
