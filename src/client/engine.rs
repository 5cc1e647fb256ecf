//! Client upload engine: drives one end-to-end multipart upload.
//!
//! The sequence is strictly sequential by design: plan the chunks, create
//! a session, then for each part request a write URL, transfer the bytes,
//! and register the returned tag — one part at a time, with bounded
//! retry-with-backoff around each part and cooperative cancellation
//! observed at part boundaries. Progress is published on a `watch`
//! channel; all state lives in the engine invocation, never in globals.

use crate::client::api::{ClientError, UploadApi};
use crate::client::planner::{self, ChunkPlan, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use crate::models::wire::CreateSessionRequest;
use bytes::Bytes;
use std::fmt;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

/// Client-side status of one upload attempt. Exactly one of `Completed`,
/// `Failed`, or `Canceled` terminates an attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
    Canceled,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
            UploadStatus::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// Snapshot published on the progress channel after every state change.
#[derive(Clone, Debug)]
pub struct UploadProgress {
    pub session_id: Option<Uuid>,
    pub total_parts: u32,
    pub uploaded_parts: u32,
    pub percentage: u8,
    pub status: UploadStatus,
    pub error: Option<String>,
}

impl UploadProgress {
    pub fn idle() -> Self {
        Self {
            session_id: None,
            total_parts: 0,
            uploaded_parts: 0,
            percentage: 0,
            status: UploadStatus::Pending,
            error: None,
        }
    }
}

/// Tuning knobs for one engine instance.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Extra attempts per part after the first transfer fails.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub backoff_base: Duration,
    pub min_chunk_size: u64,
    pub max_chunk_size: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
            min_chunk_size: MIN_CHUNK_SIZE,
            max_chunk_size: MAX_CHUNK_SIZE,
        }
    }
}

/// What to upload.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub title: String,
    pub description: String,
    pub content_type: String,
}

/// Terminal report of one upload attempt.
#[derive(Clone, Debug)]
pub struct UploadOutcome {
    pub status: UploadStatus,
    pub session_id: Option<Uuid>,
    pub uploaded_parts: u32,
    pub error: Option<String>,
}

enum PartAttempt {
    Canceled,
    Exhausted { attempts: u32, source: ClientError },
}

pub struct UploadEngine<A> {
    api: A,
    config: EngineConfig,
}

impl<A: UploadApi> UploadEngine<A> {
    pub fn new(api: A, config: EngineConfig) -> Self {
        Self { api, config }
    }

    /// Run one upload attempt to its terminal status. Never panics on
    /// failure paths; the outcome and the progress channel carry the
    /// terminal state and a human-readable reason.
    pub async fn upload(
        &self,
        request: UploadRequest,
        cancel: CancellationToken,
        progress: watch::Sender<UploadProgress>,
    ) -> UploadOutcome {
        let mut state = UploadProgress::idle();
        progress.send_replace(state.clone());

        let filename = match request
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
        {
            Some(name) => name,
            None => {
                return Self::fail_without_session(
                    &mut state,
                    &progress,
                    format!("{} has no usable filename", request.path.display()),
                );
            }
        };

        let file_size = match tokio::fs::metadata(&request.path).await {
            Ok(meta) => meta.len(),
            Err(err) => {
                return Self::fail_without_session(
                    &mut state,
                    &progress,
                    format!("cannot read {}: {}", request.path.display(), err),
                );
            }
        };

        let plan = match planner::plan_with(
            self.config.min_chunk_size,
            self.config.max_chunk_size,
            file_size,
        ) {
            Ok(plan) => plan,
            Err(err) => return Self::fail_without_session(&mut state, &progress, err.to_string()),
        };
        state.total_parts = plan.part_count;
        progress.send_replace(state.clone());

        let created = match self
            .api
            .create_session(&CreateSessionRequest {
                title: request.title.clone(),
                description: request.description.clone(),
                filename,
                size: file_size as i64,
                content_type: request.content_type.clone(),
                parts: plan.part_count,
            })
            .await
        {
            Ok(created) => created,
            Err(err) => return Self::fail_without_session(&mut state, &progress, err.to_string()),
        };
        let session_id = created.session_id;
        state.session_id = Some(session_id);
        state.status = UploadStatus::Uploading;
        progress.send_replace(state.clone());

        let mut file = match File::open(&request.path).await {
            Ok(file) => file,
            Err(err) => {
                return self
                    .fail_upload(
                        session_id,
                        &mut state,
                        &progress,
                        format!("cannot open {}: {}", request.path.display(), err),
                    )
                    .await;
            }
        };

        for part_number in 1..=plan.part_count {
            // Cancellation is cooperative: observed here at the part
            // boundary and before each retry, never mid-transfer.
            if cancel.is_cancelled() {
                return self.cancel_upload(session_id, &mut state, &progress).await;
            }

            let body = match Self::read_part(&mut file, &plan, part_number).await {
                Ok(body) => body,
                Err(err) => {
                    return self
                        .fail_upload(
                            session_id,
                            &mut state,
                            &progress,
                            format!("failed reading part {}: {}", part_number, err),
                        )
                        .await;
                }
            };

            match self
                .upload_part_with_retries(
                    session_id,
                    part_number,
                    body,
                    &request.content_type,
                    &cancel,
                )
                .await
            {
                Ok(()) => {
                    state.uploaded_parts += 1;
                    state.percentage = percentage(state.uploaded_parts, plan.part_count);
                    progress.send_replace(state.clone());
                }
                Err(PartAttempt::Canceled) => {
                    return self.cancel_upload(session_id, &mut state, &progress).await;
                }
                Err(PartAttempt::Exhausted { attempts, source }) => {
                    return self
                        .fail_upload(
                            session_id,
                            &mut state,
                            &progress,
                            format!(
                                "part {} failed after {} attempts: {}",
                                part_number, attempts, source
                            ),
                        )
                        .await;
                }
            }
        }

        // A cancellation requested during the final part's transfer must
        // still abort rather than finalize.
        if cancel.is_cancelled() {
            return self.cancel_upload(session_id, &mut state, &progress).await;
        }

        match self.api.finalize(session_id).await {
            Ok(_) => {
                state.status = UploadStatus::Completed;
                state.percentage = 100;
                progress.send_replace(state.clone());
                UploadOutcome {
                    status: UploadStatus::Completed,
                    session_id: Some(session_id),
                    uploaded_parts: state.uploaded_parts,
                    error: None,
                }
            }
            Err(err) => {
                // The server resolves its own side (failed + compensating
                // backend abort); the client only reports.
                let message = format!("finalize failed: {}", err);
                state.status = UploadStatus::Failed;
                state.error = Some(message.clone());
                progress.send_replace(state.clone());
                UploadOutcome {
                    status: UploadStatus::Failed,
                    session_id: Some(session_id),
                    uploaded_parts: state.uploaded_parts,
                    error: Some(message),
                }
            }
        }
    }

    /// One retry *unit*: request a write URL, transfer the bytes, register
    /// the returned tag. Any step failing fails the unit as a whole.
    async fn upload_part_once(
        &self,
        session_id: Uuid,
        part_number: u32,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), ClientError> {
        let issued = self.api.part_url(session_id, part_number).await?;
        let part_tag = self
            .api
            .transfer_part(&issued.url, body, content_type)
            .await?;
        self.api
            .register_part(session_id, part_number, &part_tag)
            .await
    }

    /// The single bounded-retry implementation the whole engine uses:
    /// first attempt and retries share one code path, the delay doubles
    /// per retry, and the cancellation token is re-checked before every
    /// retry.
    async fn upload_part_with_retries(
        &self,
        session_id: Uuid,
        part_number: u32,
        body: Bytes,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<(), PartAttempt> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self
                .upload_part_once(session_id, part_number, body.clone(), content_type)
                .await
            {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let retries_used = attempts - 1;
                    if retries_used >= self.config.max_retries {
                        return Err(PartAttempt::Exhausted {
                            attempts,
                            source: err,
                        });
                    }
                    let delay = self.config.backoff_base * 2u32.pow(retries_used);
                    warn!(
                        part = part_number,
                        attempt = attempts,
                        "part upload failed, retrying in {:?}: {}",
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    if cancel.is_cancelled() {
                        return Err(PartAttempt::Canceled);
                    }
                }
            }
        }
    }

    async fn read_part(
        file: &mut File,
        plan: &ChunkPlan,
        part_number: u32,
    ) -> std::io::Result<Bytes> {
        let (start, end) = plan.part_span(part_number);
        file.seek(SeekFrom::Start(start)).await?;
        let mut buf = vec![0u8; (end - start) as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    fn fail_without_session(
        state: &mut UploadProgress,
        progress: &watch::Sender<UploadProgress>,
        message: String,
    ) -> UploadOutcome {
        state.status = UploadStatus::Failed;
        state.error = Some(message.clone());
        progress.send_replace(state.clone());
        UploadOutcome {
            status: UploadStatus::Failed,
            session_id: None,
            uploaded_parts: state.uploaded_parts,
            error: Some(message),
        }
    }

    async fn fail_upload(
        &self,
        session_id: Uuid,
        state: &mut UploadProgress,
        progress: &watch::Sender<UploadProgress>,
        message: String,
    ) -> UploadOutcome {
        if let Err(err) = self.api.abort(session_id).await {
            warn!(session = %session_id, "abort after failure also failed: {}", err);
        }
        state.status = UploadStatus::Failed;
        state.error = Some(message.clone());
        progress.send_replace(state.clone());
        UploadOutcome {
            status: UploadStatus::Failed,
            session_id: Some(session_id),
            uploaded_parts: state.uploaded_parts,
            error: Some(message),
        }
    }

    async fn cancel_upload(
        &self,
        session_id: Uuid,
        state: &mut UploadProgress,
        progress: &watch::Sender<UploadProgress>,
    ) -> UploadOutcome {
        if let Err(err) = self.api.abort(session_id).await {
            warn!(session = %session_id, "abort after cancellation failed: {}", err);
        }
        state.status = UploadStatus::Canceled;
        progress.send_replace(state.clone());
        UploadOutcome {
            status: UploadStatus::Canceled,
            session_id: Some(session_id),
            uploaded_parts: state.uploaded_parts,
            error: None,
        }
    }
}

fn percentage(uploaded: u32, total: u32) -> u8 {
    ((uploaded as f64 / total as f64) * 100.0).round() as u8
}
