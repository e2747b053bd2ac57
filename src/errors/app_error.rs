//! Application-level error type for the HTTP surface.
//!
//! Adapter-specific errors (`SttError`, `TtsError`, `LlmError`,
//! `DirectoryError`) live next to their adapters; this type covers the
//! handlers and server startup paths.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Result alias for handler-level operations.
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// The request body or parameters could not be used.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Required configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A downstream service failed in a way we cannot recover from.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Configuration("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_display_message() {
        let err = AppError::BadRequest("missing field".into());
        assert_eq!(err.to_string(), "Bad request: missing field");
    }
}
