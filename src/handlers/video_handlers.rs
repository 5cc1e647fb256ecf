//! Handlers for finished videos: listing, fetching, and deleting completed
//! uploads. Download URLs are short-lived presigned reads issued per
//! request.

use crate::{
    errors::AppError,
    handlers::OwnerId,
    models::wire::{MessageResponse, VideoSummary},
    services::session_service::SessionService,
};
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

/// GET `/api/videos` — completed uploads for the caller, newest first.
pub async fn list_videos(
    State(service): State<SessionService>,
    OwnerId(owner): OwnerId,
) -> Result<impl IntoResponse, AppError> {
    let videos = service.list_completed(owner).await?;

    let summaries: Vec<VideoSummary> = videos
        .into_iter()
        .map(|video| VideoSummary::from_session(video.session, Some(video.download_url)))
        .collect();
    Ok(Json(summaries))
}

/// GET `/api/videos/{session_id}` — one completed upload with a download
/// URL.
pub async fn get_video(
    State(service): State<SessionService>,
    OwnerId(owner): OwnerId,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let video = service.get_completed(session_id, owner).await?;

    Ok(Json(VideoSummary::from_session(
        video.session,
        Some(video.download_url),
    )))
}

/// DELETE `/api/videos/{session_id}` — remove a completed upload and its
/// backend object.
pub async fn delete_video(
    State(service): State<SessionService>,
    OwnerId(owner): OwnerId,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    service.delete_completed(session_id, owner).await?;

    Ok(Json(MessageResponse {
        message: "Video deleted successfully".into(),
    }))
}
