//! Collector failure taxonomy. A collector error never takes the process
//! down; the driver that owns the collector logs it and tries again on the
//! next tick.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to parse {source}: {message}")]
    Parse { source: String, message: String },

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },
}
