//! Graduated health rollup: ok / degraded / error, derived from collector
//! error-states, upload recency, and pending-row backlog.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

const RECENCY_FLOOR_SECS: i64 = 1;

/// Overridable health thresholds. Every field defaults to the values in
/// `spec.md` §4.E; operators may tighten or loosen them via configuration.
/// `error_threshold_secs` is independent of `upload_interval` — it does not
/// scale the way the recency multipliers do.
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub error_threshold_secs: i64,
    pub error_pending_rows: i64,
    pub degraded_pending_rows: i64,
    pub recency_ok_multiplier: i64,
    pub recency_degraded_multiplier: i64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            error_threshold_secs: 600,
            error_pending_rows: 10_000,
            degraded_pending_rows: 5_000,
            recency_ok_multiplier: 2,
            recency_degraded_multiplier: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Degraded,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
    pub status: Status,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: Status,
    pub uptime_seconds: u64,
    pub components: HashMap<String, ComponentStatus>,
}

struct HealthState {
    components: HashMap<String, ComponentStatus>,
    last_successful_upload: Option<DateTime<Utc>>,
    pending_rows: i64,
}

pub struct HealthChecker {
    started_at: Instant,
    upload_interval: Duration,
    thresholds: HealthThresholds,
    state: Mutex<HealthState>,
}

impl HealthChecker {
    pub fn new(upload_interval: Duration) -> Self {
        Self::with_thresholds(upload_interval, HealthThresholds::default())
    }

    pub fn with_thresholds(upload_interval: Duration, thresholds: HealthThresholds) -> Self {
        Self {
            started_at: Instant::now(),
            upload_interval,
            thresholds,
            state: Mutex::new(HealthState {
                components: HashMap::new(),
                last_successful_upload: None,
                pending_rows: 0,
            }),
        }
    }

    pub fn record_collector_result(&self, collector: &str, ok: bool, error: Option<String>) {
        let mut state = self.state.lock().expect("health state mutex poisoned");
        state.components.insert(
            collector.to_string(),
            ComponentStatus {
                status: if ok { Status::Ok } else { Status::Error },
                updated_at: Utc::now(),
                last_error: error,
            },
        );
    }

    pub fn record_upload_result(&self, ok: bool, error: Option<String>) {
        let mut state = self.state.lock().expect("health state mutex poisoned");
        if ok {
            state.last_successful_upload = Some(Utc::now());
        }
        state.components.insert(
            "upload".to_string(),
            ComponentStatus { status: if ok { Status::Ok } else { Status::Degraded }, updated_at: Utc::now(), last_error: error },
        );
    }

    pub fn set_pending_rows(&self, pending: i64) {
        self.state.lock().expect("health state mutex poisoned").pending_rows = pending;
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn report(&self) -> HealthReport {
        let state = self.state.lock().expect("health state mutex poisoned");
        let status = self.rollup(&state);
        HealthReport { status, uptime_seconds: self.uptime_seconds(), components: state.components.clone() }
    }

    fn rollup(&self, state: &HealthState) -> Status {
        let collector_signal = collector_error_signal(&state.components);
        let recency_signal = recency_signal(state.last_successful_upload, self.upload_interval, &self.thresholds);
        let pending_signal = pending_signal(state.pending_rows, &self.thresholds);
        let combined_error = matches!(
            state.last_successful_upload,
            Some(last) if (Utc::now() - last).num_seconds() > self.thresholds.error_threshold_secs
        ) && state.pending_rows > self.thresholds.error_pending_rows
            || (state.last_successful_upload.is_none() && state.pending_rows > self.thresholds.error_pending_rows);

        let mut worst = collector_signal.max(recency_signal).max(pending_signal);
        if combined_error {
            worst = Status::Error;
        }
        worst
    }
}

fn collector_error_signal(components: &HashMap<String, ComponentStatus>) -> Status {
    let collectors: Vec<&ComponentStatus> =
        components.iter().filter(|(name, _)| *name != "upload").map(|(_, status)| status).collect();
    if collectors.is_empty() {
        return Status::Ok;
    }
    let error_count = collectors.iter().filter(|c| c.status == Status::Error).count();
    if error_count == 0 {
        Status::Ok
    } else if error_count == collectors.len() {
        Status::Error
    } else {
        Status::Degraded
    }
}

/// Recency alone never escalates past Degraded; the Error state only comes
/// from the combined recency+backlog condition computed separately.
fn recency_signal(
    last_successful_upload: Option<DateTime<Utc>>,
    upload_interval: Duration,
    thresholds: &HealthThresholds,
) -> Status {
    let Some(last) = last_successful_upload else {
        return Status::Degraded;
    };
    let elapsed = (Utc::now() - last).num_seconds();
    let interval_secs = upload_interval.as_secs() as i64;
    let ok_threshold = (interval_secs * thresholds.recency_ok_multiplier).max(RECENCY_FLOOR_SECS);
    let degraded_threshold = interval_secs * thresholds.recency_degraded_multiplier;

    if elapsed <= ok_threshold {
        Status::Ok
    } else if elapsed <= degraded_threshold {
        Status::Degraded
    } else {
        Status::Degraded
    }
}

fn pending_signal(pending: i64, thresholds: &HealthThresholds) -> Status {
    if pending < thresholds.degraded_pending_rows {
        Status::Ok
    } else if pending <= thresholds.error_pending_rows {
        Status::Degraded
    } else {
        Status::Degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_collectors_registered_is_ok() {
        let checker = HealthChecker::new(Duration::from_secs(60));
        assert_eq!(checker.report().status, Status::Ok);
    }

    #[test]
    fn one_of_two_collectors_failing_is_degraded() {
        let checker = HealthChecker::new(Duration::from_secs(60));
        checker.record_collector_result("cpu", true, None);
        checker.record_collector_result("disk", false, Some("boom".to_string()));
        assert_eq!(checker.report().status, Status::Degraded);
    }

    #[test]
    fn all_collectors_failing_is_error() {
        let checker = HealthChecker::new(Duration::from_secs(60));
        checker.record_collector_result("cpu", false, Some("boom".to_string()));
        checker.record_collector_result("disk", false, Some("boom".to_string()));
        assert_eq!(checker.report().status, Status::Error);
    }

    #[test]
    fn pending_rows_between_thresholds_is_degraded() {
        let checker = HealthChecker::new(Duration::from_secs(60));
        checker.set_pending_rows(7_000);
        assert_eq!(checker.report().status, Status::Degraded);
    }

    #[test]
    fn never_uploaded_with_large_backlog_is_error() {
        let checker = HealthChecker::new(Duration::from_secs(60));
        checker.set_pending_rows(20_000);
        assert_eq!(checker.report().status, Status::Error);
    }

    #[test]
    fn recent_upload_with_small_backlog_is_ok() {
        let checker = HealthChecker::new(Duration::from_secs(60));
        checker.record_upload_result(true, None);
        checker.set_pending_rows(100);
        assert_eq!(checker.report().status, Status::Ok);
    }

    #[test]
    fn error_threshold_is_pinned_at_ten_minutes_regardless_of_upload_interval() {
        // A 1-hour upload interval would make the 10x-interval recency
        // window 10 hours; the 600s combined-condition ceiling must still
        // apply independently once paired with backlog.
        let checker = HealthChecker::new(Duration::from_secs(3600));
        checker.set_pending_rows(20_000);
        assert_eq!(checker.report().status, Status::Error);
    }
}
