//! HTTP handlers, thin wrappers over the session service.

pub mod health_handlers;
pub mod session_handlers;
pub mod video_handlers;

use crate::errors::AppError;
use crate::models::wire::OWNER_ID_HEADER;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

/// Extracts the owner identity every session operation is scoped to.
pub struct OwnerId(pub Uuid);

impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
            .map(OwnerId)
            .ok_or_else(|| AppError::unauthorized("missing or invalid user identity"))
    }
}
