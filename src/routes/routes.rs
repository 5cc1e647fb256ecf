//! Defines routes for upload coordination and finished videos.
//!
//! ## Structure
//! - **Upload coordination**
//!   - `POST   /api/uploads` — open a multipart session
//!   - `GET    /api/uploads/part-url` — presigned write URL for one part
//!   - `POST   /api/uploads/register-part` — record a landed part
//!   - `POST   /api/uploads/finalize` — assemble parts into the video
//!   - `DELETE /api/uploads/{session_id}` — abort a pending upload
//!
//! - **Finished videos**
//!   - `GET    /api/videos` — list the caller's completed uploads
//!   - `GET    /api/videos/{session_id}` — fetch one with a download URL
//!   - `DELETE /api/videos/{session_id}` — delete video and backend object
//!
//! Part bytes themselves never travel through these routes; clients `PUT`
//! them directly to the presigned backend URLs.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        session_handlers::{
            abort_upload, create_session, finalize_upload, part_url, register_part,
        },
        video_handlers::{delete_video, get_video, list_videos},
    },
    services::session_service::SessionService,
};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Build and return the router for all upload and video routes.
///
/// The router carries shared state (`SessionService`) to all handlers.
pub fn routes() -> Router<SessionService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Upload coordination
        .route("/api/uploads", post(create_session))
        .route("/api/uploads/part-url", get(part_url))
        .route("/api/uploads/register-part", post(register_part))
        .route("/api/uploads/finalize", post(finalize_upload))
        .route("/api/uploads/{session_id}", delete(abort_upload))
        // Finished videos
        .route("/api/videos", get(list_videos))
        .route(
            "/api/videos/{session_id}",
            get(get_video).delete(delete_video),
        )
}
