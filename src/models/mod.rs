//! Core data models for the video upload coordination service.
//!
//! `upload_session` holds the persisted session and part records, mapped to
//! database rows via `sqlx::FromRow`. `wire` holds the JSON bodies shared
//! between the HTTP handlers and the client upload engine.

pub mod upload_session;
pub mod wire;
