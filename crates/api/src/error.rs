//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use coordinator::OrderError;

/// API-level error type that maps to HTTP responses.
///
/// Every error renders as `{"success": false, "message": ...}`.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Order operation error.
    Order(OrderError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Order(err) => order_error_to_response(err),
        };

        let body = serde_json::json!({ "success": false, "message": message });
        (status, axum::Json(body)).into_response()
    }
}

fn order_error_to_response(err: OrderError) -> (StatusCode, String) {
    match &err {
        OrderError::Validation(_) => (
            StatusCode::BAD_REQUEST,
            format!("Validation failed: {err}"),
        ),
        OrderError::ProductNotFound(_) | OrderError::OrderNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        OrderError::InsufficientStock { .. }
        | OrderError::AlreadyCancelled(_)
        | OrderError::InvalidState { .. }
        | OrderError::AmountOverflow(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        OrderError::LockTimeout { .. } => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        OrderError::Store(store_err) if store_err.is_retryable() => {
            tracing::warn!(error = %err, "transient store failure");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable, please retry".to_string(),
            )
        }
        OrderError::CommitFailed(_)
        | OrderError::Store(_)
        | OrderError::StockOverflow { .. }
        | OrderError::OrderNumberExhausted { .. } => {
            tracing::error!(error = %err, "internal server error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

#[cfg(test)]
mod tests {
    use common::OrderId;
    use domain::{Sku, ValidationError};
    use order_store::StoreError;

    use super::*;

    fn status_of(err: OrderError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_client_errors() {
        assert_eq!(
            status_of(OrderError::Validation(ValidationError::NoItems)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(OrderError::ProductNotFound(Sku::new("X"))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(OrderError::OrderNotFound(OrderId::new())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(OrderError::AlreadyCancelled(OrderId::new())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_retryable_errors_are_unavailable() {
        assert_eq!(
            status_of(OrderError::LockTimeout {
                resource: "product SKU001".to_string()
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(OrderError::Store(StoreError::TransactionConflict(
                "deadlock detected".to_string()
            ))),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_commit_failure_is_internal() {
        assert_eq!(
            status_of(OrderError::CommitFailed(StoreError::CommitFailed(
                "connection reset".to_string()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
