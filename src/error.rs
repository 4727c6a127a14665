//! # Error Handling
//!
//! This module defines the server's error type and how it is converted to HTTP responses.
//!
//! ## Wire format:
//! Every error response carries a single human-readable field:
//! ```json
//! { "detail": "Error processing audio file: could not find the file for transcription" }
//! ```
//! Full diagnostic detail (source chains, engine stderr) goes to the server log only.
//!
//! ## Why custom errors:
//! Handlers return `Result<HttpResponse, AppError>`, so a failure inside one request
//! can only ever become a response for that request. Nothing is thrown past the
//! handler boundary.

use crate::transcription::TranscriptionError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Prefix for every 500 response, so clients can tell processing failures apart
/// from routing or protocol errors.
const PROCESSING_ERROR_PREFIX: &str = "Error processing audio file";

/// Custom error types for the application.
///
/// ## Error Categories:
/// - **BadRequest**: Client sent no file part or a malformed form (400)
/// - **Transcription**: The engine failed on the stored file (500)
/// - **Io**: Writing, reading or deleting the stored file failed (500)
/// - **Internal**: Anything else on the server side (500)
/// - **ConfigError**: Configuration problems (500)
#[derive(Debug)]
pub enum AppError {
    /// Client sent invalid or incomplete data
    BadRequest(String),

    /// The transcription engine reported a failure
    Transcription(String),

    /// Storage problems with the uploaded audio
    Io(String),

    /// Internal server errors (worker pool shut down, etc.)
    Internal(String),

    /// Configuration file or environment variable problems
    ConfigError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Transcription(msg) => write!(f, "Transcription error: {}", msg),
            AppError::Io(msg) => write!(f, "I/O error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl AppError {
    /// The message shown to API clients.
    pub fn detail(&self) -> String {
        match self {
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Transcription(msg)
            | AppError::Io(msg)
            | AppError::Internal(msg)
            | AppError::ConfigError(msg) => format!("{}: {}", PROCESSING_ERROR_PREFIX, msg),
        }
    }
}

/// Maps each error to a status code and a `{"detail": ...}` body.
///
/// ## HTTP Status Code Mapping:
/// - BadRequest → 400 (Bad Request)
/// - everything else → 500 (Internal Server Error)
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Transcription(_)
            | AppError::Io(_)
            | AppError::Internal(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "detail": self.detail()
        }))
    }
}

impl From<TranscriptionError> for AppError {
    fn from(err: TranscriptionError) -> Self {
        AppError::Transcription(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn test_bad_request_renders_detail() {
        let response = AppError::BadRequest("No file part in request".to_string()).error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, json!({"detail": "No file part in request"}));
    }

    #[actix_web::test]
    async fn test_transcription_error_is_500_with_prefix() {
        let err: AppError = TranscriptionError::Spawn("permission denied".to_string()).into();
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json["detail"],
            "Error processing audio file: failed to start transcription engine: permission denied"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, AppError::Io(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
