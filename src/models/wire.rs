//! Request and response bodies shared by the HTTP handlers and the client
//! upload engine. Field names follow the JSON wire format (camelCase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header carrying the authenticated user's id, set by the upstream
/// authentication layer and trusted as-is by this service.
pub const OWNER_ID_HEADER: &str = "x-user-id";

/// `POST /api/uploads` request body.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub title: String,
    pub description: String,
    pub filename: String,
    pub size: i64,
    pub content_type: String,
    pub parts: u32,
}

/// `POST /api/uploads` response body.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub backend_session_token: String,
    pub key: String,
    pub parts: u32,
}

/// `GET /api/uploads/part-url` query parameters.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PartUrlQuery {
    pub session_id: Uuid,
    pub part_number: u32,
}

/// `GET /api/uploads/part-url` response body.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PartUrlResponse {
    pub url: String,
    pub part_number: u32,
}

/// `POST /api/uploads/register-part` request body.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPartRequest {
    pub session_id: Uuid,
    pub part_number: u32,
    pub part_tag: String,
}

/// The part echoed back by `register-part`.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredPartBody {
    pub part_tag: String,
    pub part_number: u32,
}

/// `POST /api/uploads/register-part` response body.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPartResponse {
    pub message: String,
    pub part: RegisteredPartBody,
}

/// `POST /api/uploads/finalize` request body.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub session_id: Uuid,
}

/// `POST /api/uploads/finalize` response body.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub message: String,
    pub object: VideoSummary,
}

/// Generic `{message}` acknowledgement.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
}

/// Public view of a video upload, used by the finalize response and the
/// completed-video endpoints. `download_url` is a short-lived presigned
/// read URL and is only present where one was issued.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VideoSummary {
    pub session_id: Uuid,
    pub title: String,
    pub description: String,
    pub filename: String,
    pub size: i64,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl VideoSummary {
    pub fn from_session(
        session: crate::models::upload_session::UploadSession,
        download_url: Option<String>,
    ) -> Self {
        Self {
            session_id: session.id,
            title: session.title,
            description: session.description,
            filename: session.filename,
            size: session.declared_size,
            completed_at: session.completed_at,
            download_url,
        }
    }
}

/// JSON error envelope produced by the server on failures.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorBody {
    pub error: String,
    pub status: u16,
}
