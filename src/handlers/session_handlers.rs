//! Handlers for the upload coordination endpoints: session creation,
//! part-URL issuance, part registration, finalize, and abort. The actual
//! part bytes never pass through these handlers — clients `PUT` them
//! straight to the presigned backend URLs.

use crate::{
    errors::AppError,
    handlers::OwnerId,
    models::wire::{
        CreateSessionRequest, CreateSessionResponse, FinalizeRequest, FinalizeResponse,
        MessageResponse, PartUrlQuery, PartUrlResponse, RegisterPartRequest,
        RegisterPartResponse, RegisteredPartBody, VideoSummary,
    },
    services::session_service::{NewUploadSession, SessionService},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// POST `/api/uploads` — open a multipart session for a new video.
pub async fn create_session(
    State(service): State<SessionService>,
    OwnerId(owner): OwnerId,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let parts = req.parts;
    let session = service
        .create_session(
            owner,
            NewUploadSession {
                title: req.title,
                description: req.description,
                filename: req.filename,
                content_type: req.content_type,
                size: req.size,
                parts: req.parts,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id,
            backend_session_token: session.backend_session_token,
            key: session.object_key,
            parts,
        }),
    ))
}

/// GET `/api/uploads/part-url?sessionId=&partNumber=` — presigned write URL
/// for one part.
pub async fn part_url(
    State(service): State<SessionService>,
    OwnerId(owner): OwnerId,
    Query(query): Query<PartUrlQuery>,
) -> Result<impl IntoResponse, AppError> {
    let url = service
        .issue_part_url(query.session_id, owner, query.part_number)
        .await?;

    Ok(Json(PartUrlResponse {
        url,
        part_number: query.part_number,
    }))
}

/// POST `/api/uploads/register-part` — record a part that landed in the
/// backend.
pub async fn register_part(
    State(service): State<SessionService>,
    OwnerId(owner): OwnerId,
    Json(req): Json<RegisterPartRequest>,
) -> Result<impl IntoResponse, AppError> {
    service
        .register_part(req.session_id, owner, req.part_number, &req.part_tag)
        .await?;

    Ok(Json(RegisterPartResponse {
        message: "Part completed".into(),
        part: RegisteredPartBody {
            part_tag: req.part_tag,
            part_number: req.part_number,
        },
    }))
}

/// POST `/api/uploads/finalize` — assemble the registered parts into the
/// finished video.
pub async fn finalize_upload(
    State(service): State<SessionService>,
    OwnerId(owner): OwnerId,
    Json(req): Json<FinalizeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = service.finalize(req.session_id, owner).await?;

    Ok(Json(FinalizeResponse {
        message: "Upload completed successfully".into(),
        object: VideoSummary::from_session(session, None),
    }))
}

/// DELETE `/api/uploads/{session_id}` — abort a pending upload.
pub async fn abort_upload(
    State(service): State<SessionService>,
    OwnerId(owner): OwnerId,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    service.abort(session_id, owner).await?;

    Ok(Json(MessageResponse {
        message: "Upload aborted successfully".into(),
    }))
}
