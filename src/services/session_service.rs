//! SessionService — the server-side state machine coordinating multipart
//! video uploads. Session metadata lives in SQLite; the object bytes never
//! pass through this service, they travel directly between the client and
//! the storage backend via presigned URLs.
//!
//! Every operation resolves `(session_id, owner_id)` as a single lookup
//! predicate, so a session is invisible to anyone but its creator. State
//! transitions are guarded with status-conditional UPDATE/DELETE statements;
//! a racing finalize or abort loses the guard and surfaces `InvalidState`.

use crate::models::upload_session::{RegisteredPart, SessionStatus, UploadSession};
use crate::services::storage_backend::{BackendError, StorageBackend, UploadedPart};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

const TITLE_MIN_LEN: usize = 3;
const DESCRIPTION_MIN_LEN: usize = 5;
const MAX_DECLARED_SIZE: i64 = 1024 * 1024 * 1024;
const MAX_DECLARED_PARTS: u32 = 10_000;
const MAX_FILENAME_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),
    #[error("upload session not found")]
    NotFound,
    #[error("{0}")]
    InvalidState(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Caller-supplied metadata for a new upload session.
#[derive(Clone, Debug)]
pub struct NewUploadSession {
    pub title: String,
    pub description: String,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub parts: u32,
}

/// A completed session paired with a fresh presigned download URL.
#[derive(Clone, Debug)]
pub struct CompletedVideo {
    pub session: UploadSession,
    pub download_url: String,
}

/// Coordinates upload sessions: creation, part registration, finalize,
/// abort, and the completed-video operations, plus the background sweep
/// for abandoned sessions.
#[derive(Clone)]
pub struct SessionService {
    /// Shared SQLite connection pool holding session metadata.
    pub db: Arc<SqlitePool>,

    backend: Arc<dyn StorageBackend>,
}

impl SessionService {
    pub fn new(db: Arc<SqlitePool>, backend: Arc<dyn StorageBackend>) -> Self {
        Self { db, backend }
    }

    /// Validate caller-supplied session metadata before any state is
    /// created. Limits match what the upload form enforces.
    fn ensure_metadata_valid(&self, meta: &NewUploadSession) -> SessionResult<()> {
        if meta.title.trim().len() < TITLE_MIN_LEN {
            return Err(SessionError::Validation(format!(
                "title must be at least {} characters",
                TITLE_MIN_LEN
            )));
        }
        if meta.description.trim().len() < DESCRIPTION_MIN_LEN {
            return Err(SessionError::Validation(format!(
                "description must be at least {} characters",
                DESCRIPTION_MIN_LEN
            )));
        }
        if meta.filename.is_empty() || meta.filename.len() > MAX_FILENAME_LEN {
            return Err(SessionError::Validation(
                "filename must be between 1 and 255 characters".into(),
            ));
        }
        if meta.content_type.is_empty() {
            return Err(SessionError::Validation("content type is required".into()));
        }
        if meta.size <= 0 {
            return Err(SessionError::Validation(
                "file size must be at least one byte".into(),
            ));
        }
        if meta.size > MAX_DECLARED_SIZE {
            return Err(SessionError::Validation(
                "file size cannot exceed 1GB".into(),
            ));
        }
        if meta.parts == 0 || meta.parts > MAX_DECLARED_PARTS {
            return Err(SessionError::Validation(format!(
                "part count must be between 1 and {}",
                MAX_DECLARED_PARTS
            )));
        }
        Ok(())
    }

    /// Build the storage key for a new upload: a collision-resistant UUID
    /// prefix plus the original filename with path-hostile characters
    /// stripped.
    fn object_key_for(filename: &str) -> String {
        let safe: String = filename
            .chars()
            .filter(|c| !matches!(c, '/' | '\\') && !c.is_control())
            .collect();
        format!("uploads/{}-{}", Uuid::new_v4(), safe)
    }

    /// Fetch a session scoped to its owner. Unknown id and not-owned id are
    /// indistinguishable to the caller.
    async fn fetch_session(&self, id: Uuid, owner_id: Uuid) -> SessionResult<UploadSession> {
        sqlx::query_as::<_, UploadSession>(
            "SELECT id, owner_id, title, description, filename, content_type, object_key,
                    backend_session_token, declared_size, declared_parts, status,
                    created_at, completed_at
             FROM upload_sessions WHERE id = ? AND owner_id = ?",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => SessionError::NotFound,
            other => SessionError::Sqlx(other),
        })
    }

    /// Registered parts of a session, sorted ascending by part number —
    /// the order the backend requires at finalize time.
    async fn parts_of(&self, id: Uuid) -> SessionResult<Vec<RegisteredPart>> {
        Ok(sqlx::query_as::<_, RegisteredPart>(
            "SELECT part_number, part_tag, registered_at
             FROM upload_parts WHERE session_id = ? ORDER BY part_number ASC",
        )
        .bind(id)
        .fetch_all(&*self.db)
        .await?)
    }

    async fn delete_parts(&self, id: Uuid) -> SessionResult<()> {
        sqlx::query("DELETE FROM upload_parts WHERE session_id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    fn ensure_part_number_valid(
        session: &UploadSession,
        part_number: u32,
    ) -> SessionResult<()> {
        if part_number == 0 || i64::from(part_number) > session.declared_parts {
            return Err(SessionError::Validation(format!(
                "part number must be between 1 and {}",
                session.declared_parts
            )));
        }
        Ok(())
    }

    /// Open a backend multipart session and persist the `pending` record.
    /// Nothing is persisted if the backend call fails.
    pub async fn create_session(
        &self,
        owner_id: Uuid,
        meta: NewUploadSession,
    ) -> SessionResult<UploadSession> {
        self.ensure_metadata_valid(&meta)?;

        let object_key = Self::object_key_for(&meta.filename);
        let token = self.backend.open(&object_key, &meta.content_type).await?;

        let session = UploadSession {
            id: Uuid::new_v4(),
            owner_id,
            title: meta.title,
            description: meta.description,
            filename: meta.filename,
            content_type: meta.content_type,
            object_key,
            backend_session_token: token,
            declared_size: meta.size,
            declared_parts: i64::from(meta.parts),
            status: SessionStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        };

        sqlx::query(
            "INSERT INTO upload_sessions (
                id, owner_id, title, description, filename, content_type, object_key,
                backend_session_token, declared_size, declared_parts, status,
                created_at, completed_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id)
        .bind(session.owner_id)
        .bind(&session.title)
        .bind(&session.description)
        .bind(&session.filename)
        .bind(&session.content_type)
        .bind(&session.object_key)
        .bind(&session.backend_session_token)
        .bind(session.declared_size)
        .bind(session.declared_parts)
        .bind(session.status)
        .bind(session.created_at)
        .bind(session.completed_at)
        .execute(&*self.db)
        .await?;

        info!(
            session = %session.id,
            key = %session.object_key,
            parts = session.declared_parts,
            "upload session created"
        );
        Ok(session)
    }

    /// Ask the backend for a time-limited write URL for one part.
    /// Idempotent — each call returns an independently valid URL.
    pub async fn issue_part_url(
        &self,
        id: Uuid,
        owner_id: Uuid,
        part_number: u32,
    ) -> SessionResult<String> {
        let session = self.fetch_session(id, owner_id).await?;
        if session.status != SessionStatus::Pending {
            return Err(SessionError::InvalidState(
                "upload already completed or failed".into(),
            ));
        }
        Self::ensure_part_number_valid(&session, part_number)?;

        Ok(self
            .backend
            .part_url(
                &session.object_key,
                &session.backend_session_token,
                part_number,
            )
            .await?)
    }

    /// Record that a part landed in the backend. Re-registering a part
    /// number replaces its tag — a part re-uploaded after a retry is legal
    /// and expected. No backend call is made.
    pub async fn register_part(
        &self,
        id: Uuid,
        owner_id: Uuid,
        part_number: u32,
        part_tag: &str,
    ) -> SessionResult<()> {
        let session = self.fetch_session(id, owner_id).await?;
        if session.status != SessionStatus::Pending {
            return Err(SessionError::InvalidState(
                "upload already completed or failed".into(),
            ));
        }
        Self::ensure_part_number_valid(&session, part_number)?;
        if part_tag.is_empty() {
            return Err(SessionError::Validation("part tag is required".into()));
        }

        sqlx::query(
            "INSERT INTO upload_parts (session_id, part_number, part_tag, registered_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(session_id, part_number) DO UPDATE SET
                part_tag = excluded.part_tag,
                registered_at = excluded.registered_at",
        )
        .bind(id)
        .bind(i64::from(part_number))
        .bind(part_tag)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        debug!(session = %id, part = part_number, "part registered");
        Ok(())
    }

    /// Assemble the registered parts into the finished object.
    ///
    /// Requires a `pending` session with at least one registered part. The
    /// transition to `processing` is a compare-and-swap on the status, so a
    /// concurrent finalize or abort cannot double-drive the backend. On
    /// backend failure the session moves to `failed` and a compensating
    /// backend abort is attempted; the record is kept for operator
    /// visibility.
    pub async fn finalize(&self, id: Uuid, owner_id: Uuid) -> SessionResult<UploadSession> {
        let session = self.fetch_session(id, owner_id).await?;
        if session.status != SessionStatus::Pending {
            return Err(SessionError::InvalidState(
                "upload already completed or failed".into(),
            ));
        }

        let parts = self.parts_of(id).await?;
        if parts.is_empty() {
            return Err(SessionError::InvalidState("no parts uploaded".into()));
        }

        let claimed = sqlx::query(
            "UPDATE upload_sessions SET status = ? WHERE id = ? AND owner_id = ? AND status = ?",
        )
        .bind(SessionStatus::Processing)
        .bind(id)
        .bind(owner_id)
        .bind(SessionStatus::Pending)
        .execute(&*self.db)
        .await?;
        if claimed.rows_affected() == 0 {
            return Err(SessionError::InvalidState(
                "session changed state during finalize".into(),
            ));
        }

        let uploaded: Vec<UploadedPart> = parts
            .iter()
            .map(|part| UploadedPart {
                part_number: part.part_number as u32,
                part_tag: part.part_tag.clone(),
            })
            .collect();

        match self
            .backend
            .finalize(
                &session.object_key,
                &session.backend_session_token,
                &uploaded,
            )
            .await
        {
            Ok(location) => {
                sqlx::query(
                    "UPDATE upload_sessions SET status = ?, completed_at = ? WHERE id = ?",
                )
                .bind(SessionStatus::Completed)
                .bind(Utc::now())
                .bind(id)
                .execute(&*self.db)
                .await?;
                // Parts are superseded by the finalized object.
                self.delete_parts(id).await?;

                info!(session = %id, %location, "upload finalized");
                self.fetch_session(id, owner_id).await
            }
            Err(err) => {
                sqlx::query("UPDATE upload_sessions SET status = ? WHERE id = ?")
                    .bind(SessionStatus::Failed)
                    .bind(id)
                    .execute(&*self.db)
                    .await?;

                if let Err(abort_err) = self
                    .backend
                    .abort(&session.object_key, &session.backend_session_token)
                    .await
                {
                    warn!(
                        session = %id,
                        "compensating abort after failed finalize also failed: {}",
                        abort_err
                    );
                }

                Err(SessionError::Backend(err))
            }
        }
    }

    /// Abort a pending upload: release the backend session, then delete the
    /// record. If the backend abort fails the record is retained unchanged
    /// so the caller can retry.
    pub async fn abort(&self, id: Uuid, owner_id: Uuid) -> SessionResult<()> {
        let session = self.fetch_session(id, owner_id).await?;
        if session.status != SessionStatus::Pending {
            return Err(SessionError::InvalidState(
                "cannot abort - upload already completed or failed".into(),
            ));
        }

        self.backend
            .abort(&session.object_key, &session.backend_session_token)
            .await?;

        let deleted = sqlx::query(
            "DELETE FROM upload_sessions WHERE id = ? AND owner_id = ? AND status = ?",
        )
        .bind(id)
        .bind(owner_id)
        .bind(SessionStatus::Pending)
        .execute(&*self.db)
        .await?;
        if deleted.rows_affected() == 0 {
            return Err(SessionError::InvalidState(
                "session changed state during abort".into(),
            ));
        }
        self.delete_parts(id).await?;

        info!(session = %id, "upload aborted");
        Ok(())
    }

    /// Completed uploads for an owner, newest first, each with a fresh
    /// presigned download URL.
    pub async fn list_completed(&self, owner_id: Uuid) -> SessionResult<Vec<CompletedVideo>> {
        let sessions = sqlx::query_as::<_, UploadSession>(
            "SELECT id, owner_id, title, description, filename, content_type, object_key,
                    backend_session_token, declared_size, declared_parts, status,
                    created_at, completed_at
             FROM upload_sessions
             WHERE owner_id = ? AND status = ?
             ORDER BY completed_at DESC",
        )
        .bind(owner_id)
        .bind(SessionStatus::Completed)
        .fetch_all(&*self.db)
        .await?;

        let mut videos = Vec::with_capacity(sessions.len());
        for session in sessions {
            let download_url = self.backend.read_url(&session.object_key).await?;
            videos.push(CompletedVideo {
                session,
                download_url,
            });
        }
        Ok(videos)
    }

    /// One completed upload with a fresh presigned download URL.
    pub async fn get_completed(&self, id: Uuid, owner_id: Uuid) -> SessionResult<CompletedVideo> {
        let session = self.fetch_session(id, owner_id).await?;
        if session.status != SessionStatus::Completed {
            return Err(SessionError::InvalidState("video is not available".into()));
        }

        let download_url = self.backend.read_url(&session.object_key).await?;
        Ok(CompletedVideo {
            session,
            download_url,
        })
    }

    /// Delete a completed upload: remove the backend object, then the
    /// record. A backend failure keeps the record so the caller can retry.
    pub async fn delete_completed(&self, id: Uuid, owner_id: Uuid) -> SessionResult<()> {
        let session = self.fetch_session(id, owner_id).await?;
        if session.status != SessionStatus::Completed {
            return Err(SessionError::InvalidState("video is not available".into()));
        }

        self.backend.delete(&session.object_key).await?;

        sqlx::query("DELETE FROM upload_sessions WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(&*self.db)
            .await?;
        self.delete_parts(id).await?;

        info!(session = %id, key = %session.object_key, "video deleted");
        Ok(())
    }

    /// Reap `pending` sessions older than `stale_after`: abort the backend
    /// session and delete the record. Sessions whose backend abort fails
    /// are left for the next sweep. Returns the number reaped.
    pub async fn sweep_stale(&self, stale_after: chrono::Duration) -> SessionResult<u64> {
        let cutoff = Utc::now() - stale_after;
        let stale = sqlx::query_as::<_, UploadSession>(
            "SELECT id, owner_id, title, description, filename, content_type, object_key,
                    backend_session_token, declared_size, declared_parts, status,
                    created_at, completed_at
             FROM upload_sessions WHERE status = ? AND created_at < ?",
        )
        .bind(SessionStatus::Pending)
        .bind(cutoff)
        .fetch_all(&*self.db)
        .await?;

        let mut reaped = 0;
        for session in stale {
            if let Err(err) = self
                .backend
                .abort(&session.object_key, &session.backend_session_token)
                .await
            {
                warn!(
                    session = %session.id,
                    "backend abort failed while reaping stale session: {}",
                    err
                );
                continue;
            }

            let deleted =
                sqlx::query("DELETE FROM upload_sessions WHERE id = ? AND status = ?")
                    .bind(session.id)
                    .bind(SessionStatus::Pending)
                    .execute(&*self.db)
                    .await?;
            if deleted.rows_affected() > 0 {
                self.delete_parts(session.id).await?;
                reaped += 1;
                info!(session = %session.id, age = %session.created_at, "reaped stale pending session");
            }
        }
        Ok(reaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Test double: records backend calls and rejects finalize part lists
    /// that are not strictly ascending by part number.
    #[derive(Default)]
    struct RecordingBackend {
        fail_finalize: AtomicBool,
        fail_abort: AtomicBool,
        fail_delete: AtomicBool,
        aborts: AtomicUsize,
        deletes: AtomicUsize,
        finalized: Mutex<Vec<Vec<UploadedPart>>>,
    }

    #[async_trait]
    impl StorageBackend for RecordingBackend {
        async fn open(&self, key: &str, _content_type: &str) -> Result<String, BackendError> {
            Ok(format!("token-for-{key}"))
        }

        async fn part_url(
            &self,
            key: &str,
            _token: &str,
            part_number: u32,
        ) -> Result<String, BackendError> {
            Ok(format!("mock://{key}?partNumber={part_number}"))
        }

        async fn finalize(
            &self,
            key: &str,
            _token: &str,
            parts: &[UploadedPart],
        ) -> Result<String, BackendError> {
            if self.fail_finalize.load(Ordering::SeqCst) {
                return Err(BackendError::new("finalize", "simulated backend failure"));
            }
            let ascending = parts
                .windows(2)
                .all(|pair| pair[0].part_number < pair[1].part_number);
            if !ascending {
                return Err(BackendError::new(
                    "finalize",
                    "parts out of order or duplicated",
                ));
            }
            self.finalized.lock().unwrap().push(parts.to_vec());
            Ok(format!("mock://{key}"))
        }

        async fn abort(&self, _key: &str, _token: &str) -> Result<(), BackendError> {
            self.aborts.fetch_add(1, Ordering::SeqCst);
            if self.fail_abort.load(Ordering::SeqCst) {
                return Err(BackendError::new("abort", "simulated backend failure"));
            }
            Ok(())
        }

        async fn delete(&self, _key: &str) -> Result<(), BackendError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(BackendError::new("delete", "simulated backend failure"));
            }
            Ok(())
        }

        async fn read_url(&self, key: &str) -> Result<String, BackendError> {
            Ok(format!("mock://read/{key}"))
        }
    }

    async fn service_with(backend: Arc<RecordingBackend>) -> SessionService {
        // One connection: an in-memory SQLite database is per-connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("open in-memory sqlite");
        for stmt in include_str!("../../migrations/0001_init.sql")
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            sqlx::query(stmt).execute(&pool).await.expect("migrate");
        }
        SessionService::new(Arc::new(pool), backend)
    }

    fn meta() -> NewUploadSession {
        NewUploadSession {
            title: "Team standup".into(),
            description: "Weekly recording".into(),
            filename: "standup.mp4".into(),
            content_type: "video/mp4".into(),
            size: 42 * 1024 * 1024,
            parts: 4,
        }
    }

    async fn status_of(service: &SessionService, id: Uuid) -> SessionStatus {
        sqlx::query_scalar::<_, SessionStatus>(
            "SELECT status FROM upload_sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&*service.db)
        .await
        .expect("session row")
    }

    async fn part_rows(service: &SessionService, id: Uuid) -> Vec<(i64, String)> {
        sqlx::query_as::<_, (i64, String)>(
            "SELECT part_number, part_tag FROM upload_parts
             WHERE session_id = ? ORDER BY part_number ASC",
        )
        .bind(id)
        .fetch_all(&*service.db)
        .await
        .expect("part rows")
    }

    #[tokio::test]
    async fn create_rejects_invalid_metadata() {
        let service = service_with(Arc::new(RecordingBackend::default())).await;
        let owner = Uuid::new_v4();

        let mut bad = meta();
        bad.title = "no".into();
        assert!(matches!(
            service.create_session(owner, bad).await,
            Err(SessionError::Validation(_))
        ));

        let mut bad = meta();
        bad.size = 0;
        assert!(matches!(
            service.create_session(owner, bad).await,
            Err(SessionError::Validation(_))
        ));

        let mut bad = meta();
        bad.size = 2 * 1024 * 1024 * 1024;
        assert!(matches!(
            service.create_session(owner, bad).await,
            Err(SessionError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn create_persists_pending_session_with_backend_token() {
        let backend = Arc::new(RecordingBackend::default());
        let service = service_with(backend).await;
        let owner = Uuid::new_v4();

        let session = service.create_session(owner, meta()).await.unwrap();
        assert_eq!(session.status, SessionStatus::Pending);
        assert!(session.object_key.starts_with("uploads/"));
        assert!(session.object_key.ends_with("-standup.mp4"));
        assert_eq!(
            session.backend_session_token,
            format!("token-for-{}", session.object_key)
        );
    }

    #[tokio::test]
    async fn operations_are_invisible_to_other_owners() {
        let service = service_with(Arc::new(RecordingBackend::default())).await;
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let session = service.create_session(owner, meta()).await.unwrap();

        assert!(matches!(
            service.issue_part_url(session.id, stranger, 1).await,
            Err(SessionError::NotFound)
        ));
        assert!(matches!(
            service.register_part(session.id, stranger, 1, "tag").await,
            Err(SessionError::NotFound)
        ));
        assert!(matches!(
            service.finalize(session.id, stranger).await,
            Err(SessionError::NotFound)
        ));
        assert!(matches!(
            service.abort(session.id, stranger).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn part_url_requires_pending_session_and_valid_part() {
        let service = service_with(Arc::new(RecordingBackend::default())).await;
        let owner = Uuid::new_v4();
        let session = service.create_session(owner, meta()).await.unwrap();

        let url = service.issue_part_url(session.id, owner, 2).await.unwrap();
        assert!(url.contains("partNumber=2"));

        assert!(matches!(
            service.issue_part_url(session.id, owner, 0).await,
            Err(SessionError::Validation(_))
        ));
        assert!(matches!(
            service.issue_part_url(session.id, owner, 5).await,
            Err(SessionError::Validation(_))
        ));
        assert!(matches!(
            service.issue_part_url(Uuid::new_v4(), owner, 1).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn reregistering_a_part_replaces_its_tag() {
        let service = service_with(Arc::new(RecordingBackend::default())).await;
        let owner = Uuid::new_v4();
        let session = service.create_session(owner, meta()).await.unwrap();

        service
            .register_part(session.id, owner, 2, "etag-first")
            .await
            .unwrap();
        service
            .register_part(session.id, owner, 2, "etag-retry")
            .await
            .unwrap();

        let rows = part_rows(&service, session.id).await;
        assert_eq!(rows, vec![(2, "etag-retry".to_string())]);
    }

    #[tokio::test]
    async fn finalize_with_no_parts_is_invalid_and_leaves_pending() {
        let service = service_with(Arc::new(RecordingBackend::default())).await;
        let owner = Uuid::new_v4();
        let session = service.create_session(owner, meta()).await.unwrap();

        assert!(matches!(
            service.finalize(session.id, owner).await,
            Err(SessionError::InvalidState(_))
        ));
        assert_eq!(status_of(&service, session.id).await, SessionStatus::Pending);
    }

    #[tokio::test]
    async fn finalize_hands_parts_to_backend_sorted_ascending() {
        let backend = Arc::new(RecordingBackend::default());
        let service = service_with(backend.clone()).await;
        let owner = Uuid::new_v4();
        let session = service.create_session(owner, meta()).await.unwrap();

        // Registered out of order on purpose.
        for (number, tag) in [(3, "e3"), (1, "e1"), (4, "e4"), (2, "e2")] {
            service
                .register_part(session.id, owner, number, tag)
                .await
                .unwrap();
        }

        let finalized = service.finalize(session.id, owner).await.unwrap();
        assert_eq!(finalized.status, SessionStatus::Completed);
        assert!(finalized.completed_at.is_some());

        {
            let calls = backend.finalized.lock().unwrap();
            assert_eq!(calls.len(), 1);
            let numbers: Vec<u32> = calls[0].iter().map(|p| p.part_number).collect();
            assert_eq!(numbers, vec![1, 2, 3, 4]);
        }

        // Parts are superseded by the finalized object.
        assert!(part_rows(&service, session.id).await.is_empty());
    }

    #[tokio::test]
    async fn finalize_backend_failure_marks_failed_and_aborts() {
        let backend = Arc::new(RecordingBackend::default());
        backend.fail_finalize.store(true, Ordering::SeqCst);
        let service = service_with(backend.clone()).await;
        let owner = Uuid::new_v4();
        let session = service.create_session(owner, meta()).await.unwrap();
        service
            .register_part(session.id, owner, 1, "e1")
            .await
            .unwrap();

        assert!(matches!(
            service.finalize(session.id, owner).await,
            Err(SessionError::Backend(_))
        ));
        assert_eq!(status_of(&service, session.id).await, SessionStatus::Failed);
        assert_eq!(backend.aborts.load(Ordering::SeqCst), 1);

        // Terminal: a second finalize attempt is rejected outright.
        assert!(matches!(
            service.finalize(session.id, owner).await,
            Err(SessionError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn abort_deletes_pending_session() {
        let backend = Arc::new(RecordingBackend::default());
        let service = service_with(backend.clone()).await;
        let owner = Uuid::new_v4();
        let session = service.create_session(owner, meta()).await.unwrap();
        service
            .register_part(session.id, owner, 1, "e1")
            .await
            .unwrap();

        service.abort(session.id, owner).await.unwrap();
        assert_eq!(backend.aborts.load(Ordering::SeqCst), 1);
        assert!(matches!(
            service.fetch_session(session.id, owner).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn abort_rejects_non_pending_sessions() {
        let backend = Arc::new(RecordingBackend::default());
        let service = service_with(backend.clone()).await;
        let owner = Uuid::new_v4();
        let session = service.create_session(owner, meta()).await.unwrap();
        service
            .register_part(session.id, owner, 1, "e1")
            .await
            .unwrap();
        service.finalize(session.id, owner).await.unwrap();

        assert!(matches!(
            service.abort(session.id, owner).await,
            Err(SessionError::InvalidState(_))
        ));
        assert_eq!(
            status_of(&service, session.id).await,
            SessionStatus::Completed
        );
        assert_eq!(backend.aborts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn abort_backend_failure_retains_record() {
        let backend = Arc::new(RecordingBackend::default());
        backend.fail_abort.store(true, Ordering::SeqCst);
        let service = service_with(backend.clone()).await;
        let owner = Uuid::new_v4();
        let session = service.create_session(owner, meta()).await.unwrap();

        assert!(matches!(
            service.abort(session.id, owner).await,
            Err(SessionError::Backend(_))
        ));
        assert_eq!(status_of(&service, session.id).await, SessionStatus::Pending);

        // Caller may retry once the backend recovers.
        backend.fail_abort.store(false, Ordering::SeqCst);
        service.abort(session.id, owner).await.unwrap();
    }

    #[tokio::test]
    async fn completed_video_listing_is_scoped_and_carries_read_urls() {
        let backend = Arc::new(RecordingBackend::default());
        let service = service_with(backend).await;
        let owner = Uuid::new_v4();

        let done = service.create_session(owner, meta()).await.unwrap();
        service.register_part(done.id, owner, 1, "e1").await.unwrap();
        service.finalize(done.id, owner).await.unwrap();

        let still_pending = service.create_session(owner, meta()).await.unwrap();

        let videos = service.list_completed(owner).await.unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].session.id, done.id);
        assert!(videos[0].download_url.starts_with("mock://read/"));

        assert!(matches!(
            service.get_completed(still_pending.id, owner).await,
            Err(SessionError::InvalidState(_))
        ));
        assert!(service
            .list_completed(Uuid::new_v4())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn delete_backend_failure_keeps_record_for_retry() {
        let backend = Arc::new(RecordingBackend::default());
        let service = service_with(backend.clone()).await;
        let owner = Uuid::new_v4();
        let session = service.create_session(owner, meta()).await.unwrap();
        service
            .register_part(session.id, owner, 1, "e1")
            .await
            .unwrap();
        service.finalize(session.id, owner).await.unwrap();

        backend.fail_delete.store(true, Ordering::SeqCst);
        assert!(matches!(
            service.delete_completed(session.id, owner).await,
            Err(SessionError::Backend(_))
        ));
        assert_eq!(
            status_of(&service, session.id).await,
            SessionStatus::Completed
        );

        backend.fail_delete.store(false, Ordering::SeqCst);
        service.delete_completed(session.id, owner).await.unwrap();
        assert!(matches!(
            service.get_completed(session.id, owner).await,
            Err(SessionError::NotFound)
        ));
        assert_eq!(backend.deletes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn sweep_reaps_only_stale_pending_sessions() {
        let backend = Arc::new(RecordingBackend::default());
        let service = service_with(backend.clone()).await;
        let owner = Uuid::new_v4();

        let stale = service.create_session(owner, meta()).await.unwrap();
        let fresh = service.create_session(owner, meta()).await.unwrap();

        sqlx::query("UPDATE upload_sessions SET created_at = ? WHERE id = ?")
            .bind(Utc::now() - chrono::Duration::hours(2))
            .bind(stale.id)
            .execute(&*service.db)
            .await
            .unwrap();

        let reaped = service
            .sweep_stale(chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(reaped, 1);
        assert_eq!(backend.aborts.load(Ordering::SeqCst), 1);
        assert!(matches!(
            service.fetch_session(stale.id, owner).await,
            Err(SessionError::NotFound)
        ));
        assert_eq!(status_of(&service, fresh.id).await, SessionStatus::Pending);
    }
}
