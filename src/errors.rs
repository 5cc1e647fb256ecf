use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::services::session_service::SessionError;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 401 Unauthorized
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

/// Map the session-service error taxonomy onto HTTP statuses: malformed
/// input and disallowed states are the caller's fault (400), unknown or
/// not-owned sessions are 404, backend failures are 502, and database
/// errors stay internal.
impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Validation(msg) => AppError::new(StatusCode::BAD_REQUEST, msg),
            SessionError::NotFound => AppError::not_found("upload session not found"),
            SessionError::InvalidState(msg) => AppError::new(StatusCode::BAD_REQUEST, msg),
            SessionError::Backend(err) => {
                tracing::error!("storage backend failure: {}", err);
                AppError::new(StatusCode::BAD_GATEWAY, err.to_string())
            }
            SessionError::Sqlx(err) => {
                tracing::error!("database failure: {}", err);
                AppError::internal("database error")
            }
        }
    }
}
