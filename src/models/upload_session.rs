//! Represents a multipart upload session and its registered parts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle state of an upload session.
///
/// `pending` sessions accept part registrations and can be aborted;
/// `processing` marks an in-flight finalize; `completed` and `failed` are
/// terminal and permit no further transitions.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One coordinated multipart upload, scoped to a single owner and a single
/// destination object key.
///
/// The row is created when the client initiates an upload and is mutated
/// only by the session service. `backend_session_token` is the opaque
/// multipart handle issued by the storage backend and is required for every
/// subsequent backend call; it is never exposed to anyone but the creator.
#[derive(Clone, FromRow, Debug)]
pub struct UploadSession {
    /// Internal UUID, generated at creation.
    pub id: Uuid,

    /// Identity of the user who initiated the upload. Every operation on
    /// the session is scoped to this owner.
    pub owner_id: Uuid,

    /// Caller-supplied display title.
    pub title: String,

    /// Caller-supplied description.
    pub description: String,

    /// Original filename of the uploaded file.
    pub filename: String,

    /// Content type (MIME type) declared by the caller.
    pub content_type: String,

    /// Storage-backend key the finished object will occupy.
    pub object_key: String,

    /// Opaque multipart-session handle returned by the storage backend.
    pub backend_session_token: String,

    /// File size in bytes, as declared at creation.
    pub declared_size: i64,

    /// Number of parts the client planned to upload.
    pub declared_parts: i64,

    /// Current lifecycle state.
    pub status: SessionStatus,

    /// Timestamp when the session was created.
    pub created_at: DateTime<Utc>,

    /// Timestamp when the session reached `completed`, if it has.
    pub completed_at: Option<DateTime<Utc>>,
}

/// A part that has landed in the storage backend and been registered with
/// the session. Unique per `(session, part_number)`; re-registering a part
/// number replaces its tag.
#[derive(Clone, FromRow, Debug)]
pub struct RegisteredPart {
    /// Part number (1-based).
    pub part_number: i64,

    /// Opaque integrity token returned by the storage backend for the
    /// stored part, required at finalize time.
    pub part_tag: String,

    /// Timestamp when this part was (last) registered.
    pub registered_at: DateTime<Utc>,
}
