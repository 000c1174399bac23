//! Metric model: the single observation type that flows through every
//! other component.
//!
//! See `MetricBuilder` for construction; a `Metric` is only ever produced
//! via `.finalize()`, which is where timestamp clamping and dedup-key
//! derivation happen.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default priority for metrics that don't specify one. Lower values are
/// more urgent; this is the "normal" tier.
pub const DEFAULT_PRIORITY: i32 = 100;

/// How far into the past a timestamp may be before it gets clamped to now.
const MAX_PAST: chrono::Duration = chrono::Duration::hours(1);
/// How far into the future a timestamp may be before it gets clamped to now.
const MAX_FUTURE: chrono::Duration = chrono::Duration::minutes(5);

/// Process-wide device identifier, stamped onto every metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a metric carries a numeric sample or a string event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Numeric,
    String,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::String => "string",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 32-byte deterministic identity of a single sample, derived from
/// `(name, timestamp_ms, device_id, canonical tags, value_type)`.
///
/// Including `value_type` in the formula is load-bearing: it keeps a
/// numeric gauge that flips to an error string at the same timestamp from
/// colliding with its own prior sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey([u8; 32]);

impl DedupKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub(crate) fn compute(
        name: &str,
        timestamp_ms: i64,
        device_id: &DeviceId,
        tags: &BTreeMap<String, String>,
        value_type: ValueType,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical_bytes(name, timestamp_ms, device_id, tags, value_type));
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }
}

impl From<[u8; 32]> for DedupKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Serializes the dedup-key input in a deterministic byte representation:
/// a JSON object with lexicographically sorted keys, tags nested the same
/// way. Two metrics differing only in tag insertion order must hash
/// identically, so `tags` is carried as a `BTreeMap` end to end.
fn canonical_bytes(
    name: &str,
    timestamp_ms: i64,
    device_id: &DeviceId,
    tags: &BTreeMap<String, String>,
    value_type: ValueType,
) -> Vec<u8> {
    let value = serde_json::json!({
        "device_id": device_id.as_str(),
        "name": name,
        "tags": tags,
        "timestamp_ms": timestamp_ms,
        "value_type": value_type.as_str(),
    });
    serde_json::to_vec(&value).expect("canonical metric encoding never fails")
}

/// Canonical tag byte representation, exposed so the upload engine's wire
/// serializer can reuse the same sorted-tags convention without recomputing
/// the dedup key.
pub fn canonical_tag_bytes(tags: &BTreeMap<String, String>) -> Vec<u8> {
    serde_json::to_vec(tags).expect("tag map encoding never fails")
}

/// A single stored observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub timestamp_ms: i64,
    pub value_type: ValueType,
    pub value_numeric: Option<f64>,
    pub value_text: Option<String>,
    pub device_id: DeviceId,
    pub tags: BTreeMap<String, String>,
    pub dedup_key: DedupKey,
    pub priority: i32,
    pub uploaded: bool,
    /// Assigned at insert time; `None` until the buffer persists the row.
    pub storage_id: Option<i64>,
}

impl Metric {
    /// Start building a numeric metric stamped with the current time.
    pub fn numeric(name: impl Into<String>, value: f64, device_id: DeviceId) -> MetricBuilder {
        MetricBuilder::new(name.into(), ValueType::Numeric, Some(value), None, device_id)
    }

    /// Start building a string (event) metric stamped with the current time.
    pub fn string(name: impl Into<String>, text: impl Into<String>, device_id: DeviceId) -> MetricBuilder {
        MetricBuilder::new(name.into(), ValueType::String, None, Some(text.into()), device_id)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.value_type, ValueType::Numeric)
    }
}

/// Fluent builder consumed by `.finalize()`, which performs timestamp
/// clamping and computes the dedup key. Not meaningfully usable before
/// `finalize` — there is no "half built" `Metric`.
pub struct MetricBuilder {
    name: String,
    value_type: ValueType,
    value_numeric: Option<f64>,
    value_text: Option<String>,
    device_id: DeviceId,
    timestamp: Option<DateTime<Utc>>,
    tags: BTreeMap<String, String>,
    priority: i32,
}

impl MetricBuilder {
    fn new(
        name: String,
        value_type: ValueType,
        value_numeric: Option<f64>,
        value_text: Option<String>,
        device_id: DeviceId,
    ) -> Self {
        Self {
            name,
            value_type,
            value_numeric,
            value_text,
            device_id,
            timestamp: None,
            tags: BTreeMap::new(),
            priority: DEFAULT_PRIORITY,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in tags {
            self.tags.insert(k.into(), v.into());
        }
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Clamps the timestamp to `[now-1h, now+5m]` (logging a warning if it
    /// had to), computes the dedup key, and produces the final `Metric`.
    pub fn finalize(self) -> Metric {
        let now = Utc::now();
        let requested = self.timestamp.unwrap_or(now);
        let earliest = now - MAX_PAST;
        let latest = now + MAX_FUTURE;

        let clamped = if requested < earliest || requested > latest {
            tracing::warn!(
                metric = %self.name,
                original_timestamp_ms = requested.timestamp_millis(),
                "metric timestamp outside [now-1h, now+5m], clamping to now"
            );
            now
        } else {
            requested
        };
        let timestamp_ms = clamped.timestamp_millis();

        let dedup_key = DedupKey::compute(
            &self.name,
            timestamp_ms,
            &self.device_id,
            &self.tags,
            self.value_type,
        );

        Metric {
            name: self.name,
            timestamp_ms,
            value_type: self.value_type,
            value_numeric: self.value_numeric,
            value_text: self.value_text,
            device_id: self.device_id,
            tags: self.tags,
            dedup_key,
            priority: self.priority,
            uploaded: false,
            storage_id: None,
        }
    }
}

#[cfg(test)]
#[path = "metric_tests.rs"]
mod tests;
