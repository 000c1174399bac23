//! Configuration surface consumed by the core (`spec.md` §6). This crate
//! only defines and validates the types; loading them from TOML/YAML/env
//! is `tidewatch-cli`'s job.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tidewatch_health::HealthThresholds;
use tidewatch_upload::UploadConfig;

use crate::errors::ConfigError;

/// Top-level configuration handed to `tidewatch-service` once validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Process-wide device identifier stamped onto every metric.
    pub device_id: String,

    pub http: HttpConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub collectors: CollectorsConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

impl ServiceConfig {
    /// Validates field-by-field, returning the first violation. Any
    /// duration must be non-zero and non-negative before use; invalid
    /// durations are a startup failure, never silently defaulted.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tidewatch_api::config::ServiceConfig;
    ///
    /// let config = ServiceConfig::default();
    /// assert!(config.validate().is_err()); // url and device_id are empty by default
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::Missing { field: "device_id" });
        }
        if self.storage.base_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing { field: "storage.base_path" });
        }
        if self.storage.wal_checkpoint_interval_secs == 0 {
            return Err(ConfigError::InvalidDuration { field: "storage.wal_checkpoint_interval_secs" });
        }
        if self.storage.wal_size_ceiling_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "storage.wal_size_ceiling_bytes",
                message: "must be greater than zero".to_string(),
            });
        }

        if self.upload.url.trim().is_empty() {
            return Err(ConfigError::Missing { field: "upload.url" });
        }
        if self.upload.timeout_secs == 0 {
            return Err(ConfigError::InvalidDuration { field: "upload.timeout_secs" });
        }
        if self.upload.interval_secs == 0 {
            return Err(ConfigError::InvalidDuration { field: "upload.interval_secs" });
        }

        self.collectors.validate()?;
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            http: HttpConfig::default(),
            storage: StorageConfig::default(),
            upload: UploadConfig {
                url: String::new(),
                auth_token: String::new(),
                batch_size: 2500,
                chunk_size: 50,
                timeout_secs: 30,
                interval_secs: 30,
                retry: Default::default(),
                content_type_override: None,
            },
            collectors: CollectorsConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

/// Health HTTP server binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 9090 }
    }
}

/// Embedded-store placement and WAL upkeep cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base path; the store derives `<base>`, `<base>-wal`, `<base>-shm`,
    /// and the lockfile collaborator derives `<base>.lock` from this.
    pub base_path: PathBuf,
    /// Periodic WAL checkpoint trigger (default hourly).
    #[serde(default = "default_wal_checkpoint_interval_secs")]
    pub wal_checkpoint_interval_secs: u64,
    /// Size-driven checkpoint trigger, checked every 30s.
    #[serde(default = "default_wal_size_ceiling_bytes")]
    pub wal_size_ceiling_bytes: u64,
}

fn default_wal_checkpoint_interval_secs() -> u64 {
    3600
}

fn default_wal_size_ceiling_bytes() -> u64 {
    64 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::new(),
            wal_checkpoint_interval_secs: default_wal_checkpoint_interval_secs(),
            wal_size_ceiling_bytes: default_wal_size_ceiling_bytes(),
        }
    }
}

/// A simple enable/interval pair shared by the collectors with no
/// additional tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorToggle {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl CollectorToggle {
    fn enabled_at(interval_secs: u64) -> Self {
        Self { enabled: true, interval_secs }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkCollectorConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default = "default_cardinality_cap")]
    pub cardinality_cap: usize,
}

fn default_cardinality_cap() -> usize {
    32
}

impl Default for NetworkCollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 15,
            exclude_patterns: Vec::new(),
            include_patterns: Vec::new(),
            cardinality_cap: default_cardinality_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockSkewConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub url: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "default_skew_warn_threshold_ms")]
    pub warn_threshold_ms: u64,
}

fn default_skew_warn_threshold_ms() -> u64 {
    2_000
}

impl Default for ClockSkewConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 300,
            url: String::new(),
            auth_token: String::new(),
            warn_threshold_ms: default_skew_warn_threshold_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorsConfig {
    pub cpu: CollectorToggle,
    pub disk: CollectorToggle,
    pub network: NetworkCollectorConfig,
    pub memory: CollectorToggle,
    pub temperature: CollectorToggle,
    #[serde(default)]
    pub clock_skew: ClockSkewConfig,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            cpu: CollectorToggle::enabled_at(10),
            disk: CollectorToggle::enabled_at(15),
            network: NetworkCollectorConfig::default(),
            memory: CollectorToggle::enabled_at(15),
            temperature: CollectorToggle::enabled_at(30),
            clock_skew: ClockSkewConfig::default(),
        }
    }
}

impl CollectorsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (enabled, interval, field) in [
            (self.cpu.enabled, self.cpu.interval_secs, "collectors.cpu.interval_secs"),
            (self.disk.enabled, self.disk.interval_secs, "collectors.disk.interval_secs"),
            (self.network.enabled, self.network.interval_secs, "collectors.network.interval_secs"),
            (self.memory.enabled, self.memory.interval_secs, "collectors.memory.interval_secs"),
            (self.temperature.enabled, self.temperature.interval_secs, "collectors.temperature.interval_secs"),
            (self.clock_skew.enabled, self.clock_skew.interval_secs, "collectors.clock_skew.interval_secs"),
        ] {
            if enabled && interval == 0 {
                return Err(ConfigError::InvalidDuration { field });
            }
        }
        if self.clock_skew.enabled && self.clock_skew.url.trim().is_empty() {
            return Err(ConfigError::Missing { field: "collectors.clock_skew.url" });
        }
        Ok(())
    }
}

/// Tri-state health threshold overrides; unset fields fall back to
/// `tidewatch_health::HealthThresholds::default()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default)]
    pub error_threshold_secs: Option<i64>,
    #[serde(default)]
    pub error_pending_rows: Option<i64>,
    #[serde(default)]
    pub degraded_pending_rows: Option<i64>,
    #[serde(default)]
    pub recency_ok_multiplier: Option<i64>,
    #[serde(default)]
    pub recency_degraded_multiplier: Option<i64>,
}

impl HealthConfig {
    pub fn resolve(&self) -> HealthThresholds {
        let defaults = HealthThresholds::default();
        HealthThresholds {
            error_threshold_secs: self.error_threshold_secs.unwrap_or(defaults.error_threshold_secs),
            error_pending_rows: self.error_pending_rows.unwrap_or(defaults.error_pending_rows),
            degraded_pending_rows: self.degraded_pending_rows.unwrap_or(defaults.degraded_pending_rows),
            recency_ok_multiplier: self.recency_ok_multiplier.unwrap_or(defaults.recency_ok_multiplier),
            recency_degraded_multiplier: self
                .recency_degraded_multiplier
                .unwrap_or(defaults.recency_degraded_multiplier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.device_id = "sbc-0001".to_string();
        config.storage.base_path = PathBuf::from("/var/lib/tidewatch/tidewatch.db");
        config.upload.url = "https://ingest.example.com/write".to_string();
        config
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn empty_device_id_is_rejected() {
        let mut config = valid_config();
        config.device_id = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::Missing { field: "device_id" })));
    }

    #[test]
    fn zero_interval_on_an_enabled_collector_is_rejected() {
        let mut config = valid_config();
        config.collectors.cpu.interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidDuration { .. })));
    }

    #[test]
    fn zero_interval_on_a_disabled_collector_is_ignored() {
        let mut config = valid_config();
        config.collectors.cpu.enabled = false;
        config.collectors.cpu.interval_secs = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_upload_interval_is_rejected() {
        let mut config = valid_config();
        config.upload.interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidDuration { field: "upload.interval_secs" })));
    }

    #[test]
    fn zero_upload_timeout_is_rejected() {
        let mut config = valid_config();
        config.upload.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidDuration { field: "upload.timeout_secs" })));
    }

    #[test]
    fn clock_skew_enabled_without_url_is_rejected() {
        let mut config = valid_config();
        config.collectors.clock_skew.enabled = true;
        config.collectors.clock_skew.interval_secs = 60;
        assert!(matches!(config.validate(), Err(ConfigError::Missing { field: "collectors.clock_skew.url" })));
    }

    #[test]
    fn unset_health_thresholds_resolve_to_defaults() {
        let config = HealthConfig::default();
        let resolved = config.resolve();
        assert_eq!(resolved.error_threshold_secs, HealthThresholds::default().error_threshold_secs);
    }

    #[test]
    fn overridden_health_threshold_is_honored() {
        let config = HealthConfig { degraded_pending_rows: Some(1_000), ..HealthConfig::default() };
        assert_eq!(config.resolve().degraded_pending_rows, 1_000);
    }
}
