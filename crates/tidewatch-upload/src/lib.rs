//! # Tidewatch Upload
//!
//! Drains unuploaded rows from the metric buffer in chunks, gzips them as
//! newline-delimited JSON, and POSTs them with jittered retry.

mod config;
mod engine;
mod error;
mod retry;
mod wire;

pub use config::{RetryConfig, UploadConfig, CHUNK_BYTE_CEILING};
pub use engine::{DrainReport, UploadEngine};
pub use error::UploadError;
pub use retry::{RetryPolicy, RetryState, Retryability};
pub use wire::{sanitize_name, CONTENT_TYPE};
