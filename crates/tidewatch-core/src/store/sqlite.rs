//! SQLite-backed implementation of `Store`.
//!
//! A single `rusqlite::Connection` guarded by a `std::sync::Mutex` is the
//! one writer; WAL journaling lets readers proceed concurrently. Every
//! public method hands its blocking work to `spawn_blocking` so the async
//! collector/upload/health tasks never stall the runtime on disk I/O.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection};

use super::migrations::run_migrations;
use super::{CheckpointReport, Store};
use crate::error::StoreError;
use crate::metric::{DedupKey, DeviceId, Metric, ValueType};

/// Row ids are marked uploaded in sub-batches of at most this many, to
/// respect host bind-parameter limits (SQLite's default is 999/32766
/// depending on build; 500 is comfortably under either).
const MARK_UPLOADED_SUBBATCH: usize = 500;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
    wal_path: PathBuf,
}

impl SqliteStore {
    /// Opens (creating if absent) the database at `path`, applies PRAGMAs
    /// for the single-writer/WAL contract, and runs any pending schema
    /// migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let mut conn = Connection::open(&db_path).map_err(|e| StoreError::Open {
            path: db_path.display().to_string(),
            message: e.to_string(),
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;
             PRAGMA temp_store=MEMORY;
             PRAGMA foreign_keys=ON;",
        )?;

        run_migrations(&mut conn)?;

        let wal_path = wal_path_for(&db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
            wal_path,
        })
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("sqlite connection mutex poisoned");
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Query {
            message: format!("store task panicked: {e}"),
        })?
    }
}

fn wal_path_for(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push("-wal");
    PathBuf::from(name)
}

fn row_to_metric(row: &rusqlite::Row) -> rusqlite::Result<Metric> {
    let id: i64 = row.get("id")?;
    let name: String = row.get("name")?;
    let timestamp_ms: i64 = row.get("timestamp_ms")?;
    let value_type_str: String = row.get("value_type")?;
    let value_numeric: Option<f64> = row.get("value_numeric")?;
    let value_text: Option<String> = row.get("value_text")?;
    let device_id: String = row.get("device_id")?;
    let tags_json: Vec<u8> = row.get("tags_json")?;
    let priority: i32 = row.get("priority")?;
    let uploaded: bool = row.get("uploaded")?;
    let dedup_bytes: Vec<u8> = row.get("dedup_key")?;

    let tags: BTreeMap<String, String> = serde_json::from_slice(&tags_json).unwrap_or_default();
    let value_type = if value_type_str == "numeric" {
        ValueType::Numeric
    } else {
        ValueType::String
    };
    let mut dedup_key = [0u8; 32];
    let len = dedup_bytes.len().min(32);
    dedup_key[..len].copy_from_slice(&dedup_bytes[..len]);

    Ok(Metric {
        name,
        timestamp_ms,
        value_type,
        value_numeric,
        value_text,
        device_id: DeviceId::new(device_id),
        tags,
        dedup_key: DedupKey::from(dedup_key),
        priority,
        uploaded,
        storage_id: Some(id),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn store_batch(&self, metrics: Vec<Metric>) -> Result<usize, StoreError> {
        self.blocking(move |conn| {
            let mut inserted = 0usize;
            // Interior mutability workaround: rusqlite transactions need
            // &mut Connection, but our trait hands us &Connection from the
            // blocking closure. We reopen a transaction-capable handle via
            // `unchecked_transaction`, which is safe here because the
            // store's mutex already guarantees exclusive access.
            let tx = conn.unchecked_transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO metrics
                        (name, timestamp_ms, value_type, value_numeric, value_text,
                         device_id, tags_json, priority, uploaded, dedup_key)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)
                     ON CONFLICT(dedup_key) DO NOTHING",
                )?;
                for metric in &metrics {
                    let tags_json = serde_json::to_vec(&metric.tags)
                        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                    let changed = stmt.execute(params![
                        metric.name,
                        metric.timestamp_ms,
                        metric.value_type.as_str(),
                        metric.value_numeric,
                        metric.value_text,
                        metric.device_id.as_str(),
                        tags_json,
                        metric.priority,
                        metric.dedup_key.as_bytes().as_slice(),
                    ])?;
                    inserted += changed;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }

    async fn query_unuploaded(&self, limit: usize) -> Result<Vec<Metric>, StoreError> {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, timestamp_ms, value_type, value_numeric, value_text,
                        device_id, tags_json, priority, uploaded, dedup_key
                 FROM metrics
                 WHERE uploaded = 0 AND value_type = 'numeric'
                 ORDER BY priority ASC, timestamp_ms ASC, id ASC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], row_to_metric)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn mark_uploaded(&self, ids: &[i64]) -> Result<(), StoreError> {
        let ids = ids.to_vec();
        self.blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            for chunk in ids.chunks(MARK_UPLOADED_SUBBATCH) {
                let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                let sql = format!("UPDATE metrics SET uploaded = 1 WHERE id IN ({placeholders})");
                tx.execute(&sql, params_from_iter(chunk.iter()))?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_pending_count(&self) -> Result<i64, StoreError> {
        self.blocking(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM metrics WHERE uploaded = 0 AND value_type = 'numeric'",
                [],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
    }

    async fn db_size(&self) -> Result<u64, StoreError> {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || std::fs::metadata(&path).map(|m| m.len()))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))?
            .or_else(|e| if e.kind() == std::io::ErrorKind::NotFound { Ok(0) } else { Err(e) })
            .map_err(StoreError::Io)
    }

    async fn wal_size(&self) -> Result<u64, StoreError> {
        let path = self.wal_path.clone();
        tokio::task::spawn_blocking(move || std::fs::metadata(&path).map(|m| m.len()))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))?
            .or_else(|e| if e.kind() == std::io::ErrorKind::NotFound { Ok(0) } else { Err(e) })
            .map_err(StoreError::Io)
    }

    async fn checkpoint_wal(&self) -> Result<CheckpointReport, StoreError> {
        self.blocking(|conn| {
            let started = Instant::now();
            let (_busy, wal_pages_remaining, pages_checkpointed): (i64, i64, i64) = conn
                .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })
                .map_err(|e| StoreError::Checkpoint { message: e.to_string() })?;
            Ok(CheckpointReport {
                wal_pages_remaining,
                pages_checkpointed,
                duration_ms: started.elapsed().as_millis() as u64,
            })
        })
        .await
    }

    async fn delete_before(&self, timestamp_ms: i64) -> Result<usize, StoreError> {
        self.blocking(move |conn| {
            let deleted = conn.execute("DELETE FROM metrics WHERE timestamp_ms < ?1", params![timestamp_ms])?;
            Ok(deleted)
        })
        .await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.checkpoint_wal().await?;
        Ok(())
    }
}

/// Row lookups for `upload_checkpoints`, used by the upload engine to
/// record observability/replay-diagnosis data. Not required for correct
/// re-drain (the `uploaded` flag is authoritative) so it lives as a small
/// side table rather than part of the `Store` trait itself.
impl SqliteStore {
    pub async fn record_checkpoint(
        &self,
        batch_id: &str,
        chunk_index: u32,
        last_row_id: i64,
        last_timestamp_ms: i64,
        accepted_count: usize,
    ) -> Result<(), StoreError> {
        let batch_id = batch_id.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO upload_checkpoints
                    (batch_id, chunk_index, last_row_id, last_timestamp_ms, accepted_count, acknowledged_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    batch_id,
                    chunk_index,
                    last_row_id,
                    last_timestamp_ms,
                    accepted_count as i64,
                    chrono::Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Row count, for tests asserting invariant 1 (`Count() == distinct dedup_key count`).
    pub async fn count(&self) -> Result<i64, StoreError> {
        self.blocking(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM metrics", [], |row| row.get(0))?;
            Ok(count)
        })
        .await
    }
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;
