//! One task per configured+enabled collector. Only a successful
//! `store_batch` call counts as a successful tick for health purposes — a
//! collector that reads fine but fails to persist is still unhealthy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tidewatch_collect::Collector;
use tidewatch_core::Store;
use tidewatch_health::{HealthChecker, MetaMetrics};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn run_driver(
    mut collector: Box<dyn Collector>,
    interval: Duration,
    store: Arc<dyn Store>,
    meta: Arc<MetaMetrics>,
    health: Arc<HealthChecker>,
    cancel: CancellationToken,
) {
    let name = collector.name();
    info!(collector = name, interval_secs = interval.as_secs(), "starting collector driver");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(collector = name, "collector driver shutting down");
                return;
            }
            _ = ticker.tick() => {
                let started = Instant::now();
                match collector.collect().await {
                    Ok(metrics) => {
                        let count = metrics.len();
                        match store.store_batch(metrics).await {
                            Ok(inserted) => {
                                meta.record_collection(name, true, count, started.elapsed());
                                health.record_collector_result(name, true, None);
                                if inserted < count {
                                    info!(collector = name, count, inserted, "some samples deduplicated on store");
                                }
                            }
                            Err(e) => {
                                meta.record_collection(name, false, 0, started.elapsed());
                                health.record_collector_result(name, false, Some(e.to_string()));
                                warn!(collector = name, error = %e, "failed to persist collected samples");
                            }
                        }
                    }
                    Err(e) => {
                        meta.record_collection(name, false, 0, started.elapsed());
                        health.record_collector_result(name, false, Some(e.to_string()));
                        warn!(collector = name, error = %e, "collection tick failed");
                    }
                }
            }
        }
    }
}
