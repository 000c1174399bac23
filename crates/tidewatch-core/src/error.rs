//! Error types for the persistent buffer.

use thiserror::Error;

/// Errors surfaced by the `Store` trait. All store errors propagate to the
/// immediate caller (driver loop, upload loop) rather than being swallowed;
/// a collector whose store write fails must record that tick as failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database at {path}: {message}")]
    Open { path: String, message: String },

    #[error("schema migration to version {version} failed: {message}")]
    Migration { version: u32, message: String },

    #[error("database query failed: {message}")]
    Query { message: String },

    #[error("WAL checkpoint failed: {message}")]
    Checkpoint { message: String },

    #[error("database I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("underlying sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Store errors that open the database or run migrations are fatal —
    /// the process should exit rather than retry. Everything else
    /// (transient query/checkpoint failures) is a normal failed-operation
    /// outcome the caller records and moves on from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Open { .. } | Self::Migration { .. })
    }
}
