//! The upload drain loop, WAL upkeep, and meta-metrics exporter tasks.
//! Each ticks independently and selects over a shared cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tidewatch_core::{DeviceId, Store};
use tidewatch_health::{HealthChecker, MetaMetrics};
use tidewatch_upload::UploadEngine;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn run_upload_task(
    engine: Arc<UploadEngine>,
    interval: Duration,
    health: Arc<HealthChecker>,
    cancel: CancellationToken,
) {
    info!(interval_secs = interval.as_secs(), "starting upload drain loop");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("upload drain loop shutting down");
                return;
            }
            _ = ticker.tick() => {
                match engine.drain_once().await {
                    Ok(report) => {
                        // Per-chunk outcomes are already recorded into `meta` by the
                        // engine itself; recording here too would double-count
                        // `uploaded_total`/`upload_failures_total`.
                        if report.rows_uploaded > 0 || report.chunks_abandoned == 0 {
                            health.record_upload_result(true, None);
                        } else {
                            health.record_upload_result(false, Some("all chunks abandoned this drain".to_string()));
                        }
                        if report.chunks_abandoned > 0 {
                            warn!(
                                chunks_sent = report.chunks_sent,
                                chunks_abandoned = report.chunks_abandoned,
                                "some chunks abandoned this drain"
                            );
                        }
                    }
                    Err(e) => {
                        health.record_upload_result(false, Some(e.to_string()));
                        warn!(error = %e, "upload drain failed");
                    }
                }
            }
        }
    }
}

/// Checks WAL size every 30s (plus an hourly ticker and an immediate
/// check at startup) and checkpoints whenever either fires.
pub async fn run_wal_upkeep_task(
    store: Arc<dyn Store>,
    size_ceiling_bytes: u64,
    hourly_interval: Duration,
    cancel: CancellationToken,
) {
    info!(size_ceiling_bytes, "starting WAL upkeep task");
    const SIZE_CHECK_INTERVAL: Duration = Duration::from_secs(30);
    let mut size_ticker = tokio::time::interval(SIZE_CHECK_INTERVAL);
    size_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut hourly_ticker = tokio::time::interval(hourly_interval);
    hourly_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    checkpoint_if_due(&store, size_ceiling_bytes, true).await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("WAL upkeep task shutting down");
                return;
            }
            _ = size_ticker.tick() => {
                checkpoint_if_due(&store, size_ceiling_bytes, false).await;
            }
            _ = hourly_ticker.tick() => {
                checkpoint_if_due(&store, size_ceiling_bytes, true).await;
            }
        }
    }
}

async fn checkpoint_if_due(store: &Arc<dyn Store>, size_ceiling_bytes: u64, force: bool) {
    if !force {
        match store.wal_size().await {
            Ok(size) if size < size_ceiling_bytes => return,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "failed to read WAL size");
                return;
            }
        }
    }
    match store.checkpoint_wal().await {
        Ok(report) => info!(
            pages_checkpointed = report.pages_checkpointed,
            wal_pages_remaining = report.wal_pages_remaining,
            duration_ms = report.duration_ms,
            "WAL checkpoint complete"
        ),
        Err(e) => warn!(error = %e, "WAL checkpoint failed"),
    }
}

/// Snapshots the process's own meta-metrics into the normal metric buffer,
/// so self-observability rides the same store/upload pipeline instead of a
/// second `/metrics` scrape endpoint.
pub async fn run_metrics_exporter_task(
    store: Arc<dyn Store>,
    meta: Arc<MetaMetrics>,
    health: Arc<HealthChecker>,
    device: DeviceId,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!(interval_secs = interval.as_secs(), "starting meta-metrics exporter");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("meta-metrics exporter shutting down");
                return;
            }
            _ = ticker.tick() => {
                let (db_size, wal_size, pending) = match (
                    store.db_size().await,
                    store.wal_size().await,
                    store.get_pending_count().await,
                ) {
                    (Ok(db_size), Ok(wal_size), Ok(pending)) => (db_size, wal_size, pending),
                    _ => {
                        warn!("failed to read storage gauges for meta-metrics snapshot");
                        continue;
                    }
                };
                meta.set_storage_gauges(db_size, wal_size, pending);
                health.set_pending_rows(pending);

                let snapshot = meta.snapshot_as_metrics(&device);
                if let Err(e) = store.store_batch(snapshot).await {
                    warn!(error = %e, "failed to persist meta-metrics snapshot");
                }
            }
        }
    }
}
