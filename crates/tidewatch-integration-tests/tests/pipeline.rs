//! Cross-crate pipeline: collector output flows into the store, the
//! upload engine drains it, and the result is visible on both the
//! meta-metrics registry and the health checker that the HTTP surface in
//! `tidewatch-api` reports from.

use std::sync::Arc;
use std::time::Duration;

use tidewatch_core::{DeviceId, Metric, SqliteStore, Store};
use tidewatch_health::{HealthChecker, MetaMetrics};
use tidewatch_upload::{RetryConfig, UploadConfig, UploadEngine};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn a_full_collect_store_upload_cycle_reports_healthy() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("tidewatch.db")).unwrap());
    let device = DeviceId::new("sbc-integration-0001");

    let samples: Vec<_> = (0..50)
        .map(|i| {
            Metric::numeric("cpu.usage_percent", i as f64, device.clone()).with_tag("core", "0").finalize()
        })
        .collect();
    store.store_batch(samples).await.unwrap();
    assert_eq!(store.get_pending_count().await.unwrap(), 50);

    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

    let meta = Arc::new(MetaMetrics::new().unwrap());
    let health = Arc::new(HealthChecker::new(Duration::from_secs(30)));
    let config = UploadConfig {
        url: server.uri(),
        auth_token: String::new(),
        batch_size: 2500,
        chunk_size: 25,
        timeout_secs: 5,
        interval_secs: 30,
        retry: RetryConfig { enabled: Some(false), ..RetryConfig::default() },
        content_type_override: None,
    };
    let engine = UploadEngine::new(store.clone(), config, meta.clone()).unwrap();

    let report = engine.drain_once().await.unwrap();
    assert_eq!(report.rows_uploaded, 50);
    assert_eq!(report.chunks_sent, 2);

    health.record_upload_result(true, None);
    health.set_pending_rows(store.get_pending_count().await.unwrap());

    assert_eq!(store.get_pending_count().await.unwrap(), 0);
    assert_eq!(health.report().status, tidewatch_health::Status::Ok);

    let snapshot = meta.snapshot_as_metrics(&device);
    assert!(snapshot.iter().any(|m| m.name == "metrics_pending_upload"));
}

#[tokio::test]
async fn string_metrics_never_enter_the_upload_queue() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("tidewatch.db")).unwrap());
    let device = DeviceId::new("sbc-integration-0002");

    store
        .store_batch(vec![
            Metric::string("boot.reason", "power-on", device.clone()).finalize(),
            Metric::numeric("cpu.usage_percent", 12.0, device.clone()).finalize(),
        ])
        .await
        .unwrap();

    let rows = store.query_unuploaded(100).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_numeric());
}
