use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the service outside the admission path.
///
/// An exceeded limit is not an error; it is a normal admission outcome.
#[derive(Debug, Error)]
pub enum ThrottlerError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<validator::ValidationErrors> for ThrottlerError {
    fn from(err: validator::ValidationErrors) -> Self {
        ThrottlerError::ValidationError(err.to_string())
    }
}

impl From<envconfig::Error> for ThrottlerError {
    fn from(err: envconfig::Error) -> Self {
        ThrottlerError::ConfigurationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ThrottlerError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_error(err: &ThrottlerError) -> Self {
        let message = err.to_string();
        match err {
            ThrottlerError::ValidationError(_) => Self::new("validation_error", &message, 422),
            ThrottlerError::NotFound(_) => Self::new("not_found", &message, 404),
            ThrottlerError::ConfigurationError(_) => {
                Self::new("configuration_error", &message, 500)
            }
            ThrottlerError::Io(_) => Self::new("internal_error", &message, 500),
        }
    }
}

impl IntoResponse for ThrottlerError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_error(&self);
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(target: "gatekeeper::error", error = %self, "Request failed");
        }
        (status, Json(body)).into_response()
    }
}
