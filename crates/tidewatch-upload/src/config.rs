//! Upload engine configuration surface, deserialized as part of the
//! process-wide config tree.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

fn default_batch_size() -> usize {
    2500
}

fn default_chunk_size() -> usize {
    50
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_interval_secs() -> u64 {
    30
}

/// Target compressed byte ceiling per chunk; implementations may over-split
/// a chunk to stay under this even if it means fewer than `chunk_size` rows.
pub const CHUNK_BYTE_CEILING: usize = 256 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Tri-state: `None` takes the default, `Some(false)` disables retries.
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub initial_backoff_ms: Option<u64>,
    #[serde(default)]
    pub max_backoff_ms: Option<u64>,
    #[serde(default)]
    pub multiplier: Option<f64>,
    #[serde(default)]
    pub jitter_percent: Option<f64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { enabled: None, max_attempts: None, initial_backoff_ms: None, max_backoff_ms: None, multiplier: None, jitter_percent: None }
    }
}

impl RetryConfig {
    /// Resolves the tri-state config into a concrete policy. Individually
    /// unset fields fall back to `RetryPolicy::default()`'s values.
    pub fn resolve(&self) -> RetryPolicy {
        if self.enabled == Some(false) {
            return RetryPolicy::disabled();
        }
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            initial_backoff: self.initial_backoff_ms.map(Duration::from_millis).unwrap_or(defaults.initial_backoff),
            max_backoff: self.max_backoff_ms.map(Duration::from_millis).unwrap_or(defaults.max_backoff),
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
            jitter_percent: self.jitter_percent.unwrap_or(defaults.jitter_percent),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub url: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Drain ticker cadence; the health recency signal scales off this.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Test-only override of the outbound `Content-Type`; never populated
    /// from real configuration sources.
    #[serde(skip)]
    pub content_type_override: Option<String>,
}

impl UploadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn content_type(&self) -> &str {
        self.content_type_override.as_deref().unwrap_or(crate::wire::CONTENT_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_disable_yields_single_attempt_policy() {
        let config = RetryConfig { enabled: Some(false), ..RetryConfig::default() };
        let policy = config.resolve();
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn unset_fields_fall_back_to_defaults() {
        let config = RetryConfig { max_attempts: Some(5), ..RetryConfig::default() };
        let policy = config.resolve();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.jitter_percent, RetryPolicy::default().jitter_percent);
    }
}
