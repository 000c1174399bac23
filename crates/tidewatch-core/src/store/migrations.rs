//! Forward-only schema migrations, executed serially at open.
//!
//! Each migration runs inside the single transaction that also records the
//! new `schema_version` row — schema changes and any required backfill
//! commit together or not at all.

use chrono::Utc;
use rusqlite::{params, Connection, Transaction};

use crate::error::StoreError;
use crate::metric::{DedupKey, DeviceId, ValueType};

/// Highest schema version this build knows how to create/migrate to.
pub const CURRENT_VERSION: u32 = 5;

pub fn run_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )?;

    let mut current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
        .unwrap_or(0);

    while current < CURRENT_VERSION {
        let next = current + 1;
        let tx = conn.transaction()?;
        apply(&tx, next)?;
        tx.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            params![next, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        current = next;
    }

    Ok(())
}

fn apply(tx: &Transaction, version: u32) -> Result<(), StoreError> {
    match version {
        1 => migrate_v1(tx),
        2 => migrate_v2(tx),
        3 => migrate_v3(tx),
        4 => migrate_v4(tx),
        5 => migrate_v5(tx),
        other => Err(StoreError::Migration {
            version: other,
            message: "no migration defined for this version".to_string(),
        }),
    }
}

fn migrate_v1(tx: &Transaction) -> Result<(), StoreError> {
    tx.execute_batch(
        "CREATE TABLE metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            timestamp_ms INTEGER NOT NULL,
            value_type TEXT NOT NULL,
            value_numeric REAL,
            value_text TEXT,
            device_id TEXT NOT NULL,
            tags_json BLOB NOT NULL,
            priority INTEGER NOT NULL,
            uploaded INTEGER NOT NULL DEFAULT 0,
            dedup_key BLOB NOT NULL UNIQUE
        )",
    )?;
    Ok(())
}

fn migrate_v2(tx: &Transaction) -> Result<(), StoreError> {
    tx.execute_batch(
        "CREATE INDEX idx_metrics_unuploaded
            ON metrics (uploaded, value_type, priority, timestamp_ms, id)",
    )?;
    Ok(())
}

fn migrate_v3(tx: &Transaction) -> Result<(), StoreError> {
    tx.execute_batch(
        "CREATE TABLE upload_checkpoints (
            batch_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            last_row_id INTEGER NOT NULL,
            last_timestamp_ms INTEGER NOT NULL,
            accepted_count INTEGER NOT NULL,
            acknowledged_at TEXT NOT NULL,
            PRIMARY KEY (batch_id, chunk_index)
        )",
    )?;
    Ok(())
}

fn migrate_v4(_tx: &Transaction) -> Result<(), StoreError> {
    // schema_version.applied_at already exists from the table's creation
    // above; this version historically added the column to a table that
    // predated it. Nothing to do on a fresh database.
    Ok(())
}

/// Rewrites every row's `dedup_key` after `value_type` joined the hash
/// formula. Bounded by the surrounding transaction and idempotent:
/// recomputing the same hash for an already-migrated row is a no-op.
fn migrate_v5(tx: &Transaction) -> Result<(), StoreError> {
    let mut stmt = tx.prepare(
        "SELECT id, name, timestamp_ms, device_id, tags_json, value_type FROM metrics",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let timestamp_ms: i64 = row.get(2)?;
            let device_id: String = row.get(3)?;
            let tags_json: Vec<u8> = row.get(4)?;
            let value_type: String = row.get(5)?;
            Ok((id, name, timestamp_ms, device_id, tags_json, value_type))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    for (id, name, timestamp_ms, device_id, tags_json, value_type_str) in rows {
        let tags: std::collections::BTreeMap<String, String> =
            serde_json::from_slice(&tags_json).unwrap_or_default();
        let value_type = if value_type_str == "numeric" {
            ValueType::Numeric
        } else {
            ValueType::String
        };
        let device = DeviceId::new(device_id);
        let new_key = DedupKey::compute(&name, timestamp_ms, &device, &tags, value_type);
        tx.execute(
            "UPDATE metrics SET dedup_key = ?1 WHERE id = ?2",
            params![new_key.as_bytes().as_slice(), id],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_row_exists_exactly_once_at_highest_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version WHERE version = ?1", [CURRENT_VERSION], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let max: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(max, CURRENT_VERSION);
    }

    #[test]
    fn rerunning_migrations_on_an_up_to_date_database_is_a_no_op() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let count: u32 = conn.query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0)).unwrap();
        assert_eq!(count, CURRENT_VERSION);
    }
}
