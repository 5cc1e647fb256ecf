//! Chunked video upload coordination: a server that tracks multipart
//! upload sessions against an S3-compatible backend, and a client engine
//! that drives sequential per-part uploads with retry and cancellation.

pub mod client;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
