//! Structured errors for the webshot server.
//!
//! Every failure leaves as JSON `{"details": "..."}` with a matching status.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use webshot_core::Error;

/// An error response.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidOptions(msg) => Self::unprocessable(format!("validate opts: {msg}")),
            Error::InvalidUrl(msg) => Self::unprocessable(format!("invalid url: {msg}")),
            Error::Render(e) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, format!("render error: {e}")),
            // The source may name object paths; only the op and key digest leave the process.
            Error::Storage { op, key, .. } => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, format!("storage error: {op} {key}"))
            }
            Error::Config(e) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, format!("config error: {e}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), details = %self.message, "request failed");
        } else {
            tracing::debug!(status = self.status.as_u16(), details = %self.message, "request rejected");
        }
        (self.status, Json(json!({ "details": self.message }))).into_response()
    }
}
