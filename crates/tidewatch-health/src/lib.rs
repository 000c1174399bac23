//! # Tidewatch Health
//!
//! The meta-metrics registry the rest of the system reports into, and the
//! graduated ok/degraded/error rollup that backs the health HTTP surface
//! exposed by `tidewatch-api`.

mod health;
mod meta_metrics;

pub use health::{ComponentStatus, HealthChecker, HealthReport, HealthThresholds, Status};
pub use meta_metrics::MetaMetrics;
