//! The `Collector` trait every metric source implements.

use async_trait::async_trait;
use tidewatch_core::Metric;

use crate::error::CollectorError;

/// A periodic source of [`Metric`] samples.
///
/// Collectors are stateful: counter-backed collectors (CPU, disk, network)
/// keep the previous raw reading between calls to compute deltas, so a
/// driver must own one long-lived instance per collector rather than
/// constructing a fresh one every tick.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Short, stable name used in logs and task naming. Not emitted as a
    /// metric tag itself.
    fn name(&self) -> &'static str;

    /// Produces zero or more samples for this tick. An empty vec is a
    /// normal result (e.g. the first call of a counter-backed collector,
    /// which only has a baseline to record).
    async fn collect(&mut self) -> Result<Vec<Metric>, CollectorError>;
}
