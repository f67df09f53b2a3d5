//! Worker error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use meridian_core::error::DomainError;
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the worker process.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failure.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),

    /// Tracing or exporter set-up failure.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// A domain component failed during start-up.
    #[error("startup error: {0}")]
    Domain(#[from] DomainError),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `DomainError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            DomainError::EventNotFound(_) => (StatusCode::NOT_FOUND, "event_not_found"),
            DomainError::DuplicateEvent(_) => (StatusCode::CONFLICT, "duplicate_event"),
            DomainError::Validation(_) | DomainError::InvalidEventKind(_) => {
                (StatusCode::BAD_REQUEST, "validation_error")
            }
            DomainError::Infrastructure(_) | DomainError::Delivery(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "infrastructure_error")
            }
            DomainError::Publishing { .. }
            | DomainError::Handler { .. }
            | DomainError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
