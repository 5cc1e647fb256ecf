//! Client for the upload coordination API, plus the raw part transfer.
//!
//! [`UploadApi`] is the seam the engine is written against; the engine's
//! tests substitute a scripted double. [`HttpUploadApi`] is the real
//! implementation: JSON calls to the coordination server and a direct
//! presigned `PUT` of each part's bytes to the storage backend.

use crate::models::wire::{
    CreateSessionRequest, CreateSessionResponse, ErrorBody, FinalizeRequest, FinalizeResponse,
    OWNER_ID_HEADER, PartUrlQuery, PartUrlResponse, RegisterPartRequest,
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, ETAG};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The coordination server rejected a request.
    #[error("server rejected request ({status}): {message}")]
    Api { status: u16, message: String },
    /// The byte transfer to a storage URL failed.
    #[error("part transfer failed: {0}")]
    Transfer(String),
    /// The storage backend's response carried no usable part tag.
    #[error("part upload response carried no part tag")]
    MissingPartTag,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Everything the upload engine needs from the outside world: the five
/// coordination calls and the direct-to-backend byte transfer.
#[async_trait]
pub trait UploadApi: Send + Sync {
    async fn create_session(
        &self,
        req: &CreateSessionRequest,
    ) -> Result<CreateSessionResponse, ClientError>;

    async fn part_url(
        &self,
        session_id: Uuid,
        part_number: u32,
    ) -> Result<PartUrlResponse, ClientError>;

    async fn register_part(
        &self,
        session_id: Uuid,
        part_number: u32,
        part_tag: &str,
    ) -> Result<(), ClientError>;

    async fn finalize(&self, session_id: Uuid) -> Result<FinalizeResponse, ClientError>;

    async fn abort(&self, session_id: Uuid) -> Result<(), ClientError>;

    /// `PUT` one part's bytes to a presigned storage URL and return the
    /// part tag from the response's `ETag` header.
    async fn transfer_part(
        &self,
        url: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<String, ClientError>;
}

/// HTTP implementation of [`UploadApi`].
pub struct HttpUploadApi {
    http: reqwest::Client,
    base_url: String,
    owner_id: Uuid,
}

impl HttpUploadApi {
    pub fn new(base_url: impl Into<String>, owner_id: Uuid) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            owner_id,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success response into an [`ClientError::Api`], decoding
    /// the server's error envelope when one is present.
    async fn expect_ok(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let message = match resp.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => format!("request failed with status {status}"),
        };
        Err(ClientError::Api { status, message })
    }
}

#[async_trait]
impl UploadApi for HttpUploadApi {
    async fn create_session(
        &self,
        req: &CreateSessionRequest,
    ) -> Result<CreateSessionResponse, ClientError> {
        let resp = self
            .http
            .post(self.endpoint("/api/uploads"))
            .header(OWNER_ID_HEADER, self.owner_id.to_string())
            .json(req)
            .send()
            .await?;
        Ok(Self::expect_ok(resp).await?.json().await?)
    }

    async fn part_url(
        &self,
        session_id: Uuid,
        part_number: u32,
    ) -> Result<PartUrlResponse, ClientError> {
        let resp = self
            .http
            .get(self.endpoint("/api/uploads/part-url"))
            .header(OWNER_ID_HEADER, self.owner_id.to_string())
            .query(&PartUrlQuery {
                session_id,
                part_number,
            })
            .send()
            .await?;
        Ok(Self::expect_ok(resp).await?.json().await?)
    }

    async fn register_part(
        &self,
        session_id: Uuid,
        part_number: u32,
        part_tag: &str,
    ) -> Result<(), ClientError> {
        let resp = self
            .http
            .post(self.endpoint("/api/uploads/register-part"))
            .header(OWNER_ID_HEADER, self.owner_id.to_string())
            .json(&RegisterPartRequest {
                session_id,
                part_number,
                part_tag: part_tag.to_string(),
            })
            .send()
            .await?;
        Self::expect_ok(resp).await?;
        Ok(())
    }

    async fn finalize(&self, session_id: Uuid) -> Result<FinalizeResponse, ClientError> {
        let resp = self
            .http
            .post(self.endpoint("/api/uploads/finalize"))
            .header(OWNER_ID_HEADER, self.owner_id.to_string())
            .json(&FinalizeRequest { session_id })
            .send()
            .await?;
        Ok(Self::expect_ok(resp).await?.json().await?)
    }

    async fn abort(&self, session_id: Uuid) -> Result<(), ClientError> {
        let resp = self
            .http
            .delete(self.endpoint(&format!("/api/uploads/{session_id}")))
            .header(OWNER_ID_HEADER, self.owner_id.to_string())
            .send()
            .await?;
        Self::expect_ok(resp).await?;
        Ok(())
    }

    async fn transfer_part(
        &self,
        url: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<String, ClientError> {
        let resp = self
            .http
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ClientError::Transfer(format!(
                "part upload returned status {}",
                resp.status()
            )));
        }

        // The backend's ETag header is the part tag handed back at
        // registration; a missing tag fails the attempt, it is never
        // substituted with a fabricated value.
        resp.headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim_matches('"').to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ClientError::MissingPartTag)
    }
}
