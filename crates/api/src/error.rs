//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use service::ServiceError;
use store::StoreError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),

    /// Error raised while dispatching a message.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Returns the HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Service(err) => service_error_status(err),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn service_error_status(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::InvalidSku { .. } => StatusCode::BAD_REQUEST,
        ServiceError::Domain(
            DomainError::OutOfStock { .. }
            | DomainError::OrderNotFound { .. }
            | DomainError::BatchNotFound { .. }
            | DomainError::SkuMismatch { .. },
        ) => StatusCode::BAD_REQUEST,
        ServiceError::Store(store_err) if store_err.is_conflict() => StatusCode::CONFLICT,
        ServiceError::Store(
            StoreError::DuplicateBatch { .. } | StoreError::DuplicateProduct { .. },
        ) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        } else {
            tracing::debug!(%status, error = %message, "request rejected");
        }

        let body = serde_json::json!({ "message": message });
        (status, axum::Json(body)).into_response()
    }
}
