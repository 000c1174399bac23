//! Scenario tests S1-S4 and S9, and invariants 1-4 from `spec.md` §8.

use tempfile::tempdir;

use super::*;
use crate::metric::DeviceId;

fn device() -> DeviceId {
    DeviceId::new("test-device")
}

async fn open_store() -> (SqliteStore, tempfile::TempDir) {
    let dir = tempdir().expect("tempdir");
    let store = SqliteStore::open(dir.path().join("tidewatch.db")).expect("open store");
    (store, dir)
}

#[tokio::test]
async fn s1_dedup_on_retry() {
    let (store, _dir) = open_store().await;
    let metrics: Vec<_> = (0..10)
        .map(|i| Metric::numeric(format!("metric.{i}"), i as f64, device()).finalize())
        .collect();

    store.store_batch(metrics.clone()).await.unwrap();
    store.store_batch(metrics).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 10);
    assert_eq!(store.get_pending_count().await.unwrap(), 10);
}

#[tokio::test]
async fn s2_mark_uploaded_round_trip() {
    let (store, _dir) = open_store().await;
    let metrics: Vec<_> = (0..3)
        .map(|i| Metric::numeric(format!("metric.{i}"), i as f64, device()).finalize())
        .collect();
    store.store_batch(metrics).await.unwrap();

    let rows = store.query_unuploaded(100).await.unwrap();
    assert_eq!(rows.len(), 3);

    let ids: Vec<i64> = rows.iter().map(|m| m.storage_id.unwrap()).collect();
    store.mark_uploaded(&ids).await.unwrap();

    assert_eq!(store.get_pending_count().await.unwrap(), 0);
    assert_eq!(store.query_unuploaded(100).await.unwrap().len(), 0);
}

#[tokio::test]
async fn s3_string_metrics_are_not_uploaded() {
    let (store, _dir) = open_store().await;
    let mut metrics = vec![
        Metric::string("event.a", "boot", device()).finalize(),
        Metric::string("event.b", "shutdown", device()).finalize(),
    ];
    metrics.push(Metric::numeric("cpu.usage", 12.5, device()).finalize());
    store.store_batch(metrics).await.unwrap();

    let rows = store.query_unuploaded(100).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_numeric());

    let ids: Vec<i64> = rows.iter().map(|m| m.storage_id.unwrap()).collect();
    store.mark_uploaded(&ids).await.unwrap();

    assert_eq!(store.get_pending_count().await.unwrap(), 0);
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn s4_batch_ceiling() {
    let (store, _dir) = open_store().await;
    let metrics: Vec<_> = (0..3000)
        .map(|i| {
            Metric::numeric(format!("metric.{i}"), i as f64, device())
                .with_tag("i", i.to_string())
                .finalize()
        })
        .collect();
    store.store_batch(metrics).await.unwrap();

    let first = store.query_unuploaded(2500).await.unwrap();
    assert_eq!(first.len(), 2500);
    let ids: Vec<i64> = first.iter().map(|m| m.storage_id.unwrap()).collect();
    store.mark_uploaded(&ids).await.unwrap();

    let second = store.query_unuploaded(2500).await.unwrap();
    assert_eq!(second.len(), 500);
    let ids: Vec<i64> = second.iter().map(|m| m.storage_id.unwrap()).collect();
    store.mark_uploaded(&ids).await.unwrap();

    let third = store.query_unuploaded(2500).await.unwrap();
    assert_eq!(third.len(), 0);
}

#[tokio::test]
async fn query_unuploaded_orders_by_priority_then_time_then_id() {
    let (store, _dir) = open_store().await;
    let low_priority = Metric::numeric("low", 1.0, device()).with_priority(200).finalize();
    let high_priority = Metric::numeric("high", 1.0, device()).with_priority(0).finalize();
    store.store_batch(vec![low_priority, high_priority]).await.unwrap();

    let rows = store.query_unuploaded(100).await.unwrap();
    assert_eq!(rows[0].name, "high");
    assert_eq!(rows[1].name, "low");
}

#[tokio::test]
async fn s9_wal_size_trigger_checkpoint_reduces_wal() {
    let (store, _dir) = open_store().await;
    let metrics: Vec<_> = (0..500)
        .map(|i| {
            Metric::numeric(format!("metric.{i}"), i as f64, device())
                .with_tag("payload", "x".repeat(64))
                .finalize()
        })
        .collect();
    store.store_batch(metrics).await.unwrap();

    let before = store.wal_size().await.unwrap();
    let report = store.checkpoint_wal().await.unwrap();
    let after = store.wal_size().await.unwrap();

    assert_eq!(report.wal_pages_remaining, 0);
    assert!(after <= before);
}
