use crate::services::storage_backend::S3Config;
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, time::Duration};

const DEFAULT_PRESIGN_EXPIRY_SECS: u64 = 3600;
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 900;
const DEFAULT_REAPER_STALE_SECS: u64 = 3600;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub s3: S3Config,
    /// How often the stale-session reaper runs.
    pub reaper_interval: Duration,
    /// Age after which an untouched `pending` session is reaped.
    pub reaper_stale_after: Duration,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked video upload coordination API")]
pub struct Args {
    /// Host to bind to (overrides VIDEO_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides VIDEO_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides VIDEO_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// S3 bucket holding finished videos (overrides VIDEO_STORE_S3_BUCKET)
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// S3 region (overrides VIDEO_STORE_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Custom S3-compatible endpoint, e.g. a local MinIO
    /// (overrides VIDEO_STORE_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// Presigned URL expiry in seconds (overrides VIDEO_STORE_PRESIGN_EXPIRY_SECS)
    #[arg(long)]
    pub presign_expiry_secs: Option<u64>,

    /// Stale-session sweep interval in seconds
    /// (overrides VIDEO_STORE_REAPER_INTERVAL_SECS)
    #[arg(long)]
    pub reaper_interval_secs: Option<u64>,

    /// Age in seconds after which a pending session is reaped
    /// (overrides VIDEO_STORE_REAPER_STALE_SECS)
    #[arg(long)]
    pub reaper_stale_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("VIDEO_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("VIDEO_STORE_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing VIDEO_STORE_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading VIDEO_STORE_PORT"),
        };
        let env_db = env::var("VIDEO_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/video_store.db".into());
        let env_bucket = env::var("VIDEO_STORE_S3_BUCKET").unwrap_or_else(|_| "videos".into());
        let env_region =
            env::var("VIDEO_STORE_S3_REGION").unwrap_or_else(|_| "us-east-1".into());
        let env_endpoint = env::var("VIDEO_STORE_S3_ENDPOINT").ok();
        let presign_expiry_secs = args
            .presign_expiry_secs
            .or_else(|| parse_env_secs("VIDEO_STORE_PRESIGN_EXPIRY_SECS"))
            .unwrap_or(DEFAULT_PRESIGN_EXPIRY_SECS);
        let reaper_interval_secs = args
            .reaper_interval_secs
            .or_else(|| parse_env_secs("VIDEO_STORE_REAPER_INTERVAL_SECS"))
            .unwrap_or(DEFAULT_REAPER_INTERVAL_SECS);
        let reaper_stale_secs = args
            .reaper_stale_secs
            .or_else(|| parse_env_secs("VIDEO_STORE_REAPER_STALE_SECS"))
            .unwrap_or(DEFAULT_REAPER_STALE_SECS);

        // Credentials come from the environment only; when absent, the
        // ambient AWS credential chain is used.
        let access_key_id = env::var("VIDEO_STORE_S3_ACCESS_KEY_ID").ok();
        let secret_access_key = env::var("VIDEO_STORE_S3_SECRET_ACCESS_KEY").ok();

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            s3: S3Config {
                bucket: args.s3_bucket.unwrap_or(env_bucket),
                region: args.s3_region.unwrap_or(env_region),
                endpoint: args.s3_endpoint.or(env_endpoint),
                access_key_id,
                secret_access_key,
                presign_expiry: Duration::from_secs(presign_expiry_secs),
            },
            reaper_interval: Duration::from_secs(reaper_interval_secs),
            reaper_stale_after: Duration::from_secs(reaper_stale_secs),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env_secs(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|value| value.parse().ok())
}
