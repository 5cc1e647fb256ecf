//! Storage backend adapter for S3-compatible multipart object storage.
//!
//! The session service only ever talks to the backend through the
//! [`StorageBackend`] trait: open a multipart session, presign a part
//! write URL, finalize the parts into one object, abort, delete, and
//! presign a read URL. [`S3Backend`] implements it with the AWS SDK; tests
//! substitute their own double.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use std::time::Duration;
use thiserror::Error;

/// A storage backend call failed. The core does not distinguish transient
/// from permanent failures; callers decide whether to retry.
#[derive(Debug, Error)]
#[error("storage backend {operation} failed: {message}")]
pub struct BackendError {
    pub operation: &'static str,
    pub message: String,
}

impl BackendError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// A `(part number, part tag)` pair handed to [`StorageBackend::finalize`].
/// The list must be sorted ascending by part number with no duplicates;
/// backends reject anything else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedPart {
    pub part_number: u32,
    pub part_tag: String,
}

/// External-collaborator contract wrapping an S3-compatible multipart API.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Open a multipart session for `key`, returning the backend's opaque
    /// session token.
    async fn open(&self, key: &str, content_type: &str) -> Result<String, BackendError>;

    /// Issue a time-limited URL the client can `PUT` part bytes to.
    async fn part_url(
        &self,
        key: &str,
        token: &str,
        part_number: u32,
    ) -> Result<String, BackendError>;

    /// Assemble previously stored parts into one durable object and return
    /// its location.
    async fn finalize(
        &self,
        key: &str,
        token: &str,
        parts: &[UploadedPart],
    ) -> Result<String, BackendError>;

    /// Release all storage-side resources of an incomplete session.
    async fn abort(&self, key: &str, token: &str) -> Result<(), BackendError>;

    /// Delete a finished object.
    async fn delete(&self, key: &str) -> Result<(), BackendError>;

    /// Issue a time-limited URL for reading a finished object.
    async fn read_url(&self, key: &str) -> Result<String, BackendError>;
}

/// Connection settings for [`S3Backend`].
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO etc.). When set,
    /// path-style addressing is used.
    pub endpoint: Option<String>,
    /// Static credentials. When absent the ambient AWS credential chain
    /// (env, profile, instance role) is used.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Expiry window for presigned part-write and read URLs.
    pub presign_expiry: Duration,
}

/// S3-compatible backend using the AWS SDK.
pub struct S3Backend {
    client: Client,
    bucket: String,
    presign_expiry: Duration,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("presign_expiry", &self.presign_expiry)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    pub async fn new(cfg: &S3Config) -> Result<Self, BackendError> {
        if cfg.access_key_id.is_some() != cfg.secret_access_key.is_some() {
            return Err(BackendError::new(
                "config",
                "access key id and secret access key must be set together",
            ));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()));
        if let (Some(id), Some(secret)) = (&cfg.access_key_id, &cfg.secret_access_key) {
            loader = loader
                .credentials_provider(Credentials::new(id, secret, None, None, "video-store"));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &cfg.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: cfg.bucket.clone(),
            presign_expiry: cfg.presign_expiry,
        })
    }

    fn presigning(&self, operation: &'static str) -> Result<PresigningConfig, BackendError> {
        PresigningConfig::expires_in(self.presign_expiry)
            .map_err(|err| BackendError::new(operation, err.to_string()))
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn open(&self, key: &str, content_type: &str) -> Result<String, BackendError> {
        let out = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| BackendError::new("open", err.to_string()))?;

        // The SDK models UploadId as optional; a response without one is
        // unusable for every subsequent call.
        out.upload_id()
            .map(str::to_string)
            .ok_or_else(|| BackendError::new("open", "backend returned no multipart session id"))
    }

    async fn part_url(
        &self,
        key: &str,
        token: &str,
        part_number: u32,
    ) -> Result<String, BackendError> {
        let presigned = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(token)
            .part_number(part_number as i32)
            .presigned(self.presigning("part_url")?)
            .await
            .map_err(|err| BackendError::new("part_url", err.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    async fn finalize(
        &self,
        key: &str,
        token: &str,
        parts: &[UploadedPart],
    ) -> Result<String, BackendError> {
        let completed = parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.part_number as i32)
                    .e_tag(&part.part_tag)
                    .build()
            })
            .collect();

        let out = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(token)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|err| BackendError::new("finalize", err.to_string()))?;

        Ok(out.location().map(str::to_string).unwrap_or_else(|| key.to_string()))
    }

    async fn abort(&self, key: &str, token: &str) -> Result<(), BackendError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(token)
            .send()
            .await
            .map_err(|err| BackendError::new("abort", err.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| BackendError::new("delete", err.to_string()))?;
        Ok(())
    }

    async fn read_url(&self, key: &str) -> Result<String, BackendError> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(self.presigning("read_url")?)
            .await
            .map_err(|err| BackendError::new("read_url", err.to_string()))?;

        Ok(presigned.uri().to_string())
    }
}
