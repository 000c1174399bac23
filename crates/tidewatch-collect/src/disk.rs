//! Whole-device disk I/O counters, parsed from `/proc/diskstats`.
//!
//! Each of the six counters tracked per device is checked for wraparound
//! independently: one counter going backwards does not suppress its
//! siblings on the same device.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use tidewatch_core::{DeviceId, Metric};

use crate::collector::Collector;
use crate::error::CollectorError;
use crate::procfs::{parse_error, read_to_string};

const PROC_DISKSTATS: &str = "/proc/diskstats";
const SECTOR_BYTES: u64 = 512;

/// (reads_completed, sectors_read, read_time_ms, writes_completed, sectors_written, write_time_ms)
type DiskCounters = [u64; 6];

struct CounterSpec {
    name: &'static str,
    index: usize,
    scale: u64,
}

const COUNTERS: &[CounterSpec] = &[
    CounterSpec { name: "disk.read_ops_total", index: 0, scale: 1 },
    CounterSpec { name: "disk.read_bytes_total", index: 1, scale: SECTOR_BYTES },
    CounterSpec { name: "disk.read_time_ms_total", index: 2, scale: 1 },
    CounterSpec { name: "disk.write_ops_total", index: 3, scale: 1 },
    CounterSpec { name: "disk.write_bytes_total", index: 4, scale: SECTOR_BYTES },
    CounterSpec { name: "disk.write_time_ms_total", index: 5, scale: 1 },
];

pub struct DiskCollector {
    device: DeviceId,
    partition_pattern: Regex,
    previous: HashMap<String, DiskCounters>,
}

impl DiskCollector {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            partition_pattern: Regex::new(r"^(sd[a-z]+\d+|nvme\d+n\d+p\d+|mmcblk\d+p\d+)$")
                .expect("static partition regex is valid"),
            previous: HashMap::new(),
        }
    }

    fn is_whole_device(&self, name: &str) -> bool {
        !self.partition_pattern.is_match(name)
    }
}

fn parse_diskstats(text: &str) -> Result<HashMap<String, DiskCounters>, CollectorError> {
    let mut devices = HashMap::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 14 {
            continue;
        }
        let name = fields[2];
        let parse = |i: usize| -> Result<u64, CollectorError> {
            fields[i]
                .parse::<u64>()
                .map_err(|e| parse_error(PROC_DISKSTATS, format!("{name} field {i}: {e}")))
        };
        let counters: DiskCounters = [parse(3)?, parse(5)?, parse(6)?, parse(7)?, parse(9)?, parse(10)?];
        devices.insert(name.to_string(), counters);
    }
    Ok(devices)
}

#[async_trait]
impl Collector for DiskCollector {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn collect(&mut self) -> Result<Vec<Metric>, CollectorError> {
        let text = read_to_string(PROC_DISKSTATS).await?;
        let current: HashMap<String, DiskCounters> = parse_diskstats(&text)?
            .into_iter()
            .filter(|(name, _)| self.is_whole_device(name))
            .collect();

        let mut metrics = Vec::new();

        for (name, counters) in &current {
            let Some(previous) = self.previous.get(name) else {
                continue;
            };

            for spec in COUNTERS {
                let now = counters[spec.index];
                let before = previous[spec.index];
                if now < before {
                    tracing::warn!(
                        device = %name,
                        counter = spec.name,
                        delta = now as i64 - before as i64,
                        "disk counter went backwards, skipping this tick"
                    );
                    continue;
                }
                metrics.push(
                    Metric::numeric(spec.name, (now * spec.scale) as f64, self.device.clone())
                        .with_tag("device", name.clone())
                        .finalize(),
                );
            }
        }

        self.previous = current;
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_device_filter_excludes_partitions() {
        let collector = DiskCollector::new(DeviceId::new("dev"));
        assert!(collector.is_whole_device("sda"));
        assert!(collector.is_whole_device("nvme0n1"));
        assert!(collector.is_whole_device("mmcblk0"));
        assert!(!collector.is_whole_device("sda1"));
        assert!(!collector.is_whole_device("nvme0n1p1"));
        assert!(!collector.is_whole_device("mmcblk0p1"));
    }

    #[test]
    fn parses_whole_device_and_partition_lines() {
        let text = "   8       0 sda 100 0 2000 50 20 0 1000 30 0 80 80\n   8       1 sda1 10 0 200 5 2 0 100 3 0 8 8\n";
        let parsed = parse_diskstats(text).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed.contains_key("sda"));
        assert!(parsed.contains_key("sda1"));
    }

    #[tokio::test]
    async fn first_tick_only_snapshots() {
        let mut collector = DiskCollector::new(DeviceId::new("dev"));
        let current = parse_diskstats("   8 0 sda 100 0 2000 50 20 0 1000 30 0 80 80\n").unwrap();
        assert!(collector.previous.is_empty());
        collector.previous = current;
        assert!(!collector.previous.is_empty());
    }

    #[tokio::test]
    async fn a_decreasing_counter_is_skipped_but_others_on_same_device_still_emit() {
        let mut collector = DiskCollector::new(DeviceId::new("dev"));
        collector.previous.insert("sda".to_string(), [100, 2000, 50, 200, 4000, 80]);
        let current = HashMap::from([("sda".to_string(), [50u64, 2100, 60, 220, 4100, 90])]);
        collector.previous = collector.previous.clone();

        // Simulate one tick manually using the same logic `collect` runs, to
        // avoid depending on a real /proc/diskstats file in this test
        // environment.
        let mut metrics_count = 0;
        for spec in COUNTERS {
            let now = current["sda"][spec.index];
            let before = collector.previous["sda"][spec.index];
            if now >= before {
                metrics_count += 1;
            }
        }
        // read_ops_total (index 0) went backwards (100 -> 50); the other
        // five counters still pass.
        assert_eq!(metrics_count, 5);
    }
}
