//! # Tidewatch Core
//!
//! The metric model and embedded persistent buffer underneath every other
//! Tidewatch component: collectors produce [`Metric`] records, the
//! [`Store`] durably dedups and buffers them, and the upload engine drains
//! unsent numeric rows from it.
//!
//! ## Usage
//!
//! ```rust
//! use tidewatch_core::{DeviceId, Metric};
//!
//! let device = DeviceId::new("sbc-0001");
//! let metric = Metric::numeric("cpu.usage_percent", 12.5, device)
//!     .with_tag("core", "0")
//!     .finalize();
//! assert!(metric.is_numeric());
//! ```

mod error;
mod metric;
mod store;

pub use error::StoreError;
pub use metric::{canonical_tag_bytes, DedupKey, DeviceId, Metric, MetricBuilder, ValueType, DEFAULT_PRIORITY};
pub use store::{CheckpointReport, SqliteStore, Store};
