//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::{RemoteConfigError, SagaError};
use state_store::StoreError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Saga operation error.
    Saga(SagaError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    let status = match &err {
        SagaError::SagaNotFound(_) => StatusCode::NOT_FOUND,
        SagaError::InvalidTransition { .. } | SagaError::AlreadyStarted(_) => StatusCode::CONFLICT,
        SagaError::InvalidOrder(_) => StatusCode::BAD_REQUEST,
        SagaError::Dispatch { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SagaError::Store(_) | SagaError::Domain(_) => {
            tracing::error!(error = %err, "internal server error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

/// Errors assembling the application at start-up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("state store: {0}")]
    Store(#[from] StoreError),

    #[error("remote adapter: {0}")]
    Remote(#[from] RemoteConfigError),
}
