use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Body of every trust denial, whichever rule was last consulted.
pub const FORBIDDEN_MESSAGE: &str = "Forbidden: Invalid access token";

/// Body of every 404.
pub const NOT_FOUND_MESSAGE: &str = "File not found";

/// Body of every 500. I/O details stay in the server log.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Preview server error types with their HTTP mapping.
///
/// # Request Errors
///
/// - `AuthDenied` - 403, never retried; the client must present credentials again
/// - `NotFound` - 404, terminal
/// - `Io` - 500, fails the request only; the listener keeps serving
///
/// # Lifecycle Errors
///
/// - `Bind` - returned synchronously from `start`; the instance stays stopped
/// - `AlreadyRunning` - `start` on a running instance; nothing changes
/// - `Config` - invalid environment configuration for the binary
#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("Forbidden: Invalid access token")]
    AuthDenied,

    #[error("File not found")]
    NotFound,

    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Instance is already running on port {0}")]
    AlreadyRunning(u16),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PreviewError {
    /// HTTP status this error maps to when it reaches a client.
    pub fn status(&self) -> StatusCode {
        match self {
            PreviewError::AuthDenied => StatusCode::FORBIDDEN,
            PreviewError::NotFound => StatusCode::NOT_FOUND,
            PreviewError::Io(_)
            | PreviewError::Bind { .. }
            | PreviewError::AlreadyRunning(_)
            | PreviewError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body: `{"error": "..."}`.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

impl IntoResponse for PreviewError {
    fn into_response(self) -> Response {
        let status = self.status();

        let error = match &self {
            PreviewError::AuthDenied => FORBIDDEN_MESSAGE,
            PreviewError::NotFound => NOT_FOUND_MESSAGE,
            _ => {
                // Full details server-side only
                tracing::error!(error = %self, "Request failed");
                INTERNAL_ERROR_MESSAGE
            }
        };

        (status, axum::Json(ErrorResponse { error })).into_response()
    }
}

/// Convenience type alias for Results with PreviewError.
pub type PreviewResult<T> = Result<T, PreviewError>;
