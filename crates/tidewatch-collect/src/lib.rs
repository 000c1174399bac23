//! # Tidewatch Collect
//!
//! The [`Collector`] trait and the concrete on-device sources: CPU, disk,
//! network, memory, temperature, and clock skew. Each hand-parses the
//! relevant Linux procfs/sysfs text format directly; counter-backed
//! collectors carry the previous raw reading as instance state so deltas
//! and wraparound can be computed per call.
//!
//! Driving these on a schedule and wiring their output into the store is
//! the job of the service binary, not this crate.

mod collector;
mod cpu;
mod disk;
mod error;
mod memory;
mod network;
mod procfs;
mod temperature;

mod clock_skew;

pub use clock_skew::ClockSkewCollector;
pub use collector::Collector;
pub use cpu::CpuCollector;
pub use disk::DiskCollector;
pub use error::CollectorError;
pub use memory::MemoryCollector;
pub use network::NetworkCollector;
pub use temperature::TemperatureCollector;
