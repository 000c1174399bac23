//! Thermal zone readings from `/sys/class/thermal/thermal_zone*`.

use async_trait::async_trait;
use tidewatch_core::{DeviceId, Metric};

use crate::collector::Collector;
use crate::error::CollectorError;
use crate::procfs::{list_dir_names, parse_error, read_to_string};

const THERMAL_ROOT: &str = "/sys/class/thermal";

pub struct TemperatureCollector {
    device: DeviceId,
}

impl TemperatureCollector {
    pub fn new(device: DeviceId) -> Self {
        Self { device }
    }
}

fn parse_millidegrees(zone: &str, text: &str) -> Result<f64, CollectorError> {
    text.trim()
        .parse::<i64>()
        .map(|millidegrees| millidegrees as f64 / 1000.0)
        .map_err(|e| parse_error(THERMAL_ROOT, format!("{zone}: {e}")))
}

#[async_trait]
impl Collector for TemperatureCollector {
    fn name(&self) -> &'static str {
        "temperature"
    }

    async fn collect(&mut self) -> Result<Vec<Metric>, CollectorError> {
        let entries = list_dir_names(THERMAL_ROOT).await?;
        let mut metrics = Vec::new();

        for entry in entries {
            if !entry.starts_with("thermal_zone") {
                continue;
            }
            let zone_type = read_to_string(&format!("{THERMAL_ROOT}/{entry}/type"))
                .await
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|_| entry.clone());
            let temp_text = match read_to_string(&format!("{THERMAL_ROOT}/{entry}/temp")).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(zone = %entry, error = %e, "failed to read thermal zone temperature");
                    continue;
                }
            };
            let celsius = parse_millidegrees(&entry, &temp_text)?;
            metrics.push(
                Metric::numeric("temperature.celsius", celsius, self.device.clone())
                    .with_tag("zone", zone_type)
                    .finalize(),
            );
        }

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_millidegrees_to_celsius() {
        assert_eq!(parse_millidegrees("thermal_zone0", "45231").unwrap(), 45.231);
    }

    #[test]
    fn rejects_non_numeric_reading() {
        assert!(parse_millidegrees("thermal_zone0", "not-a-number").is_err());
    }
}
