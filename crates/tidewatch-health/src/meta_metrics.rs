//! Meta-metrics: what the engine exports about itself. A thin wrapper
//! around a `prometheus::Registry` for the process's own `/metrics`-style
//! introspection, plus rolling-window percentile tracking the `prometheus`
//! crate doesn't provide natively (its histograms are bucket-based, not
//! nearest-rank over a fixed sample window).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use prometheus::{Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use tidewatch_core::{DeviceId, Metric};

/// Samples kept per duration-histogram window before the oldest is evicted.
const WINDOW_SIZE: usize = 100;

pub struct MetaMetrics {
    registry: Registry,
    collected_total: IntCounterVec,
    failed_total: IntCounterVec,
    collector_duration_windows: Mutex<HashMap<String, VecDeque<f64>>>,
    uploaded_total: IntCounter,
    upload_failures_total: IntCounter,
    upload_duration_window: Mutex<VecDeque<f64>>,
    database_size_bytes: Gauge,
    wal_size_bytes: Gauge,
    metrics_pending_upload: IntGauge,
    skew_ms: GaugeVec,
}

impl MetaMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let collected_total = IntCounterVec::new(
            Opts::new("metrics_collected_total", "Samples produced by each collector"),
            &["collector"],
        )?;
        let failed_total = IntCounterVec::new(
            Opts::new("metrics_failed_total", "Failed collection ticks per collector"),
            &["collector"],
        )?;
        let uploaded_total = IntCounter::new("uploaded_total", "Rows successfully uploaded")?;
        let upload_failures_total =
            IntCounter::new("upload_failures_total", "Upload attempts that failed")?;
        let database_size_bytes =
            Gauge::new("database_size_bytes", "On-disk size of the metric buffer")?;
        let wal_size_bytes = Gauge::new("wal_size_bytes", "Size of the buffer's WAL file")?;
        let metrics_pending_upload =
            IntGauge::new("metrics_pending_upload", "Unuploaded numeric rows")?;
        let skew_ms = GaugeVec::new(
            Opts::new("time_skew_ms", "Local clock skew vs remote"),
            &["device_id"],
        )?;

        // Metrics are constructed directly rather than via the `register_*!`
        // macros, which register against `prometheus::default_registry()`
        // instead of the `Registry` owned here. A process-global registry
        // would reject a second `MetaMetrics::new()` call outright, which
        // every test in this crate (and in `tidewatch-upload`) makes.
        for collectable in [
            Box::new(collected_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(failed_total.clone()),
            Box::new(uploaded_total.clone()),
            Box::new(upload_failures_total.clone()),
            Box::new(database_size_bytes.clone()),
            Box::new(wal_size_bytes.clone()),
            Box::new(metrics_pending_upload.clone()),
            Box::new(skew_ms.clone()),
        ] {
            registry.register(collectable)?;
        }

        Ok(Self {
            registry,
            collected_total,
            failed_total,
            collector_duration_windows: Mutex::new(HashMap::new()),
            uploaded_total,
            upload_failures_total,
            upload_duration_window: Mutex::new(VecDeque::with_capacity(WINDOW_SIZE)),
            database_size_bytes,
            wal_size_bytes,
            metrics_pending_upload,
            skew_ms,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_collection(&self, collector: &str, success: bool, count: usize, duration: Duration) {
        if success {
            self.collected_total.with_label_values(&[collector]).inc_by(count as u64);
        } else {
            self.failed_total.with_label_values(&[collector]).inc();
        }
        push_sample(&self.collector_duration_windows, collector, duration.as_secs_f64() * 1000.0);
    }

    pub fn record_upload(&self, success: bool, rows: usize, duration: Duration) {
        if success {
            self.uploaded_total.inc_by(rows as u64);
        } else {
            self.upload_failures_total.inc();
        }
        let mut window = self.upload_duration_window.lock().expect("upload duration window mutex poisoned");
        push_bounded(&mut window, duration.as_secs_f64() * 1000.0);
    }

    pub fn set_storage_gauges(&self, database_size_bytes: u64, wal_size_bytes: u64, pending: i64) {
        self.database_size_bytes.set(database_size_bytes as f64);
        self.wal_size_bytes.set(wal_size_bytes as f64);
        self.metrics_pending_upload.set(pending);
    }

    pub fn set_skew_ms(&self, device_id: &str, skew_ms: f64) {
        self.skew_ms.with_label_values(&[device_id]).set(skew_ms);
    }

    pub fn collector_percentiles(&self, collector: &str) -> (f64, f64, f64) {
        let windows = self.collector_duration_windows.lock().expect("collector duration window mutex poisoned");
        match windows.get(collector) {
            Some(samples) => percentiles(samples),
            None => (0.0, 0.0, 0.0),
        }
    }

    pub fn upload_percentiles(&self) -> (f64, f64, f64) {
        let window = self.upload_duration_window.lock().expect("upload duration window mutex poisoned");
        percentiles(&window)
    }

    /// Snapshots current gauge state as ordinary metric rows, so this
    /// process's own health rides the same buffer and upload pipeline as
    /// everything it collects.
    pub fn snapshot_as_metrics(&self, device: &DeviceId) -> Vec<Metric> {
        let mut metrics = vec![
            Metric::numeric("database_size_bytes", self.database_size_bytes.get(), device.clone()).finalize(),
            Metric::numeric("wal_size_bytes", self.wal_size_bytes.get(), device.clone()).finalize(),
            Metric::numeric("metrics_pending_upload", self.metrics_pending_upload.get() as f64, device.clone())
                .finalize(),
        ];

        let (p50, p95, p99) = self.upload_percentiles();
        metrics.push(Metric::numeric("upload.duration_ms", p50, device.clone()).with_tag("quantile", "p50").finalize());
        metrics.push(Metric::numeric("upload.duration_ms", p95, device.clone()).with_tag("quantile", "p95").finalize());
        metrics.push(Metric::numeric("upload.duration_ms", p99, device.clone()).with_tag("quantile", "p99").finalize());

        let windows = self.collector_duration_windows.lock().expect("collector duration window mutex poisoned");
        for (collector, samples) in windows.iter() {
            let (p50, p95, p99) = percentiles(samples);
            metrics.push(
                Metric::numeric("collector.duration_ms", p50, device.clone())
                    .with_tag("collector", collector.clone())
                    .with_tag("quantile", "p50")
                    .finalize(),
            );
            metrics.push(
                Metric::numeric("collector.duration_ms", p95, device.clone())
                    .with_tag("collector", collector.clone())
                    .with_tag("quantile", "p95")
                    .finalize(),
            );
            metrics.push(
                Metric::numeric("collector.duration_ms", p99, device.clone())
                    .with_tag("collector", collector.clone())
                    .with_tag("quantile", "p99")
                    .finalize(),
            );
        }

        metrics
    }
}

fn push_sample(windows: &Mutex<HashMap<String, VecDeque<f64>>>, key: &str, value: f64) {
    let mut windows = windows.lock().expect("collector duration window mutex poisoned");
    let window = windows.entry(key.to_string()).or_insert_with(|| VecDeque::with_capacity(WINDOW_SIZE));
    push_bounded(window, value);
}

fn push_bounded(window: &mut VecDeque<f64>, value: f64) {
    if window.len() == WINDOW_SIZE {
        window.pop_front();
    }
    window.push_back(value);
}

/// Nearest-rank percentile over an unsorted window; `percentile` is in
/// `[0, 100]`.
fn nearest_rank(samples: &[f64], percentile: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("duration samples are never NaN"));
    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}

fn percentiles(window: &VecDeque<f64>) -> (f64, f64, f64) {
    let samples: Vec<f64> = window.iter().copied().collect();
    (nearest_rank(&samples, 50.0), nearest_rank(&samples, 95.0), nearest_rank(&samples, 99.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_rank_matches_known_values() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        assert_eq!(nearest_rank(&samples, 50.0), 5.0);
        assert_eq!(nearest_rank(&samples, 100.0), 10.0);
    }

    #[test]
    fn empty_window_reports_zero() {
        assert_eq!(nearest_rank(&[], 95.0), 0.0);
    }

    #[test]
    fn window_evicts_oldest_sample_past_capacity() {
        let metrics = MetaMetrics::new().unwrap();
        for i in 0..(WINDOW_SIZE + 10) {
            metrics.record_collection("cpu", true, 1, Duration::from_millis(i as u64));
        }
        let windows = metrics.collector_duration_windows.lock().unwrap();
        assert_eq!(windows["cpu"].len(), WINDOW_SIZE);
    }

    #[test]
    fn failed_collection_increments_failed_counter_not_collected() {
        let metrics = MetaMetrics::new().unwrap();
        metrics.record_collection("disk", false, 0, Duration::from_millis(5));
        assert_eq!(metrics.failed_total.with_label_values(&["disk"]).get(), 1);
        assert_eq!(metrics.collected_total.with_label_values(&["disk"]).get(), 0);
    }
}
