//! # Tidewatch Service
//!
//! Process wiring: turns a validated [`ServiceConfig`] into a running set
//! of cooperating tasks (collector drivers, the upload drain loop, WAL
//! upkeep, the meta-metrics exporter, and the health HTTP server) and
//! tears them all down together on shutdown.
//!
//! Configuration loading itself is `tidewatch-cli`'s job; this crate only
//! consumes an already-validated [`ServiceConfig`].

mod driver;
mod tasks;

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tidewatch_api::config::ServiceConfig;
use tidewatch_collect::{
    ClockSkewCollector, Collector, CpuCollector, DiskCollector, MemoryCollector, NetworkCollector,
    TemperatureCollector,
};
use tidewatch_core::{DeviceId, SqliteStore, Store};
use tidewatch_health::{HealthChecker, MetaMetrics};
use tidewatch_upload::UploadEngine;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// Cadence for the meta-metrics exporter; independent of the upload
/// drain interval since it writes into the buffer, not out to the wire.
const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Runs the full set of Tidewatch tasks until `shutdown` resolves.
/// `shutdown` completing cancels every task and this function returns
/// once they've all joined.
pub async fn run(config: ServiceConfig, shutdown: impl std::future::Future<Output = ()>) -> anyhow::Result<()> {
    let session_id = Uuid::new_v4();
    let span = tracing::info_span!("tidewatch", session_id = %session_id);
    let _guard = span.enter();
    info!(session_id = %session_id, device_id = %config.device_id, "starting tidewatch");

    let device = DeviceId::new(config.device_id.clone());
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&config.storage.base_path)?);
    let meta = Arc::new(MetaMetrics::new()?);
    let upload_interval = Duration::from_secs(config.upload.interval_secs);
    let health = Arc::new(HealthChecker::with_thresholds(upload_interval, config.health.resolve()));

    let upload_engine = Arc::new(UploadEngine::new(store.clone(), config.upload.clone(), meta.clone())?);
    let shared_http_client = upload_engine.client();

    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();

    for (collector, interval_secs) in build_collectors(&config, &device, shared_http_client) {
        let interval = Duration::from_secs(interval_secs);
        let store = store.clone();
        let meta = meta.clone();
        let health = health.clone();
        let cancel = cancel.child_token();
        tasks.spawn(driver::run_driver(collector, interval, store, meta, health, cancel));
    }

    tasks.spawn(tasks::run_upload_task(
        upload_engine,
        upload_interval,
        health.clone(),
        cancel.child_token(),
    ));

    tasks.spawn(tasks::run_wal_upkeep_task(
        store.clone(),
        config.storage.wal_size_ceiling_bytes,
        Duration::from_secs(config.storage.wal_checkpoint_interval_secs),
        cancel.child_token(),
    ));

    tasks.spawn(tasks::run_metrics_exporter_task(
        store.clone(),
        meta.clone(),
        health.clone(),
        device.clone(),
        METRICS_EXPORT_INTERVAL,
        cancel.child_token(),
    ));

    let http_config = config.http.clone();
    let http_cancel = cancel.child_token();
    let app_state = tidewatch_api::AppState::new(health.clone());
    tasks.spawn(async move {
        if let Err(e) = tidewatch_api::serve(&http_config, app_state, http_cancel.cancelled_owned()).await {
            tracing::error!(error = %e, "health HTTP server exited with an error");
        }
    });

    shutdown.await;
    info!("shutdown requested, cancelling tasks");
    cancel.cancel();

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            tracing::error!(error = %e, "a task panicked during shutdown");
        }
    }

    store.close().await?;
    info!("tidewatch stopped");
    Ok(())
}

/// Builds one boxed collector per configured+enabled source, paired with
/// its tick interval. Counter-backed collectors are constructed once here
/// and own their baseline state for the lifetime of the process.
fn build_collectors(
    config: &ServiceConfig,
    device: &DeviceId,
    http_client: reqwest::Client,
) -> Vec<(Box<dyn Collector>, u64)> {
    let mut collectors: Vec<(Box<dyn Collector>, u64)> = Vec::new();
    let c = &config.collectors;

    if c.cpu.enabled {
        collectors.push((Box::new(CpuCollector::new(device.clone())), c.cpu.interval_secs));
    }
    if c.disk.enabled {
        collectors.push((Box::new(DiskCollector::new(device.clone())), c.disk.interval_secs));
    }
    if c.memory.enabled {
        collectors.push((Box::new(MemoryCollector::new(device.clone())), c.memory.interval_secs));
    }
    if c.temperature.enabled {
        collectors.push((Box::new(TemperatureCollector::new(device.clone())), c.temperature.interval_secs));
    }
    if c.network.enabled {
        let include = if c.network.include_patterns.is_empty() {
            None
        } else {
            Regex::new(&c.network.include_patterns.join("|")).ok()
        };
        let mut network = NetworkCollector::new(device.clone());
        if !c.network.exclude_patterns.is_empty() || include.is_some() {
            // Matches nothing when no custom exclude list is configured,
            // so an include-only override doesn't silently reinstate the
            // built-in loopback/docker/veth exclusions.
            let exclude = if c.network.exclude_patterns.is_empty() {
                Regex::new(r"^$a").expect("unmatchable placeholder regex is valid")
            } else {
                Regex::new(&c.network.exclude_patterns.join("|")).unwrap_or_else(|_| {
                    Regex::new(r"^$a").expect("unmatchable placeholder regex is valid")
                })
            };
            network = network.with_filters(exclude, include, c.network.cardinality_cap);
        }
        collectors.push((Box::new(network), c.network.interval_secs));
    }
    if c.clock_skew.enabled {
        let skew = ClockSkewCollector::new(
            device.clone(),
            http_client,
            c.clock_skew.url.clone(),
            c.clock_skew.auth_token.clone(),
        )
        .with_warn_threshold_ms(c.clock_skew.warn_threshold_ms as i64);
        collectors.push((Box::new(skew), c.clock_skew.interval_secs));
    }

    collectors
}
