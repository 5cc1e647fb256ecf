//! CLI uploader: drives the client upload engine against a running
//! video-store server. Ctrl-C requests cooperative cancellation — the
//! current part finishes, then the session is aborted.

use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use video_store::client::{
    api::HttpUploadApi,
    engine::{EngineConfig, UploadEngine, UploadProgress, UploadRequest, UploadStatus},
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Upload a video in chunks to a video-store server")]
struct Args {
    /// Video file to upload
    file: PathBuf,

    /// Video title
    #[arg(long)]
    title: String,

    /// Video description
    #[arg(long)]
    description: String,

    /// Coordination server base URL
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Owner id sent as the x-user-id header (random when omitted)
    #[arg(long)]
    user: Option<Uuid>,

    /// Content type of the file
    #[arg(long, default_value = "video/mp4")]
    content_type: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if !args.file.exists() {
        bail!("file not found: {}", args.file.display());
    }

    let owner = args.user.unwrap_or_else(Uuid::new_v4);
    let api = HttpUploadApi::new(&args.server, owner)?;
    let engine = UploadEngine::new(api, EngineConfig::default());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("cancellation requested, finishing the current part...");
                cancel.cancel();
            }
        });
    }

    let (progress_tx, mut progress_rx) = watch::channel(UploadProgress::idle());
    let printer = tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            let snapshot = progress_rx.borrow_and_update().clone();
            println!(
                "[{}] {}/{} parts ({}%)",
                snapshot.status, snapshot.uploaded_parts, snapshot.total_parts, snapshot.percentage
            );
        }
    });

    let outcome = engine
        .upload(
            UploadRequest {
                path: args.file,
                title: args.title,
                description: args.description,
                content_type: args.content_type,
            },
            cancel,
            progress_tx,
        )
        .await;
    let _ = printer.await;

    match outcome.status {
        UploadStatus::Completed => {
            let session = outcome
                .session_id
                .map(|id| id.to_string())
                .unwrap_or_default();
            println!("upload complete: session {session}");
            Ok(())
        }
        UploadStatus::Canceled => {
            println!("upload canceled after {} parts", outcome.uploaded_parts);
            Ok(())
        }
        _ => {
            bail!(
                "upload failed: {}",
                outcome.error.unwrap_or_else(|| "unknown error".into())
            )
        }
    }
}
