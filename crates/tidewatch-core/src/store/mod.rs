//! Persistent buffer contract: a durable, single-writer, key-ordered store
//! of metric records with dedup, upload-state tracking, and WAL upkeep.

mod migrations;
mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::metric::Metric;

/// Result of a WAL checkpoint, as reported by `PRAGMA wal_checkpoint`.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointReport {
    /// Pages still in the WAL after the checkpoint (0 for a full TRUNCATE).
    pub wal_pages_remaining: i64,
    /// Pages moved back into the main database file.
    pub pages_checkpointed: i64,
    pub duration_ms: u64,
}

/// Durable buffer of metric records. Every method serializes at the store
/// boundary transparently — callers do not need to coordinate locking
/// themselves (see `spec.md` §4.B tuning requirements).
#[async_trait]
pub trait Store: Send + Sync {
    /// Inserts a batch of metrics in one transaction. Duplicate
    /// `dedup_key`s are silently dropped (`ON CONFLICT DO NOTHING`), never
    /// surfaced as an error. Returns the number of rows actually inserted.
    async fn store_batch(&self, metrics: Vec<Metric>) -> Result<usize, StoreError>;

    /// Up to `limit` numeric, unuploaded rows, ordered
    /// `(priority ASC, timestamp_ms ASC, id ASC)`, with `storage_id` filled
    /// in so the caller can mark them uploaded later.
    async fn query_unuploaded(&self, limit: usize) -> Result<Vec<Metric>, StoreError>;

    /// Marks the given row ids uploaded, in sub-batches of at most 500 to
    /// respect host bind-parameter limits.
    async fn mark_uploaded(&self, ids: &[i64]) -> Result<(), StoreError>;

    /// Count of numeric, unuploaded rows. Drives health; string events
    /// never contribute here.
    async fn get_pending_count(&self) -> Result<i64, StoreError>;

    /// Size in bytes of the main database file.
    async fn db_size(&self) -> Result<u64, StoreError>;

    /// Size in bytes of the write-ahead log file.
    async fn wal_size(&self) -> Result<u64, StoreError>;

    /// Forces a truncating checkpoint of the write-ahead log.
    async fn checkpoint_wal(&self) -> Result<CheckpointReport, StoreError>;

    /// Deletes rows older than `timestamp_ms`. Retention policy is an
    /// operator concern, not part of the core contract.
    async fn delete_before(&self, timestamp_ms: i64) -> Result<usize, StoreError>;

    /// Performs a final WAL checkpoint before the handle is released.
    async fn close(&self) -> Result<(), StoreError>;
}
