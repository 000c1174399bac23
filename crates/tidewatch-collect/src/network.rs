//! Network interface counters, parsed from `/proc/net/dev`.
//!
//! Applies an exclude filter, then an include filter, then a hard
//! cardinality cap; the cumulative drop count crosses the cap is exported
//! as its own meta-metric rather than silently lost.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use tidewatch_core::{DeviceId, Metric};

use crate::collector::Collector;
use crate::error::CollectorError;
use crate::procfs::{parse_error, read_to_string};

const PROC_NET_DEV: &str = "/proc/net/dev";
const DEFAULT_CARDINALITY_CAP: usize = 32;

/// (rx_bytes, rx_packets, rx_errors, tx_bytes, tx_packets, tx_errors)
type NetCounters = [u64; 6];

struct CounterSpec {
    name: &'static str,
    index: usize,
}

const COUNTERS: &[CounterSpec] = &[
    CounterSpec { name: "network.rx_bytes_total", index: 0 },
    CounterSpec { name: "network.rx_packets_total", index: 1 },
    CounterSpec { name: "network.rx_errors_total", index: 2 },
    CounterSpec { name: "network.tx_bytes_total", index: 3 },
    CounterSpec { name: "network.tx_packets_total", index: 4 },
    CounterSpec { name: "network.tx_errors_total", index: 5 },
];

fn default_exclude() -> Regex {
    Regex::new(r"^(lo|docker\d*|br-[0-9a-f]+|veth[0-9a-f]*|virbr\d*|wl.*mon\d*|usb\d+|wwan\d*)$")
        .expect("static exclude regex is valid")
}

pub struct NetworkCollector {
    device: DeviceId,
    exclude: Regex,
    include: Option<Regex>,
    cardinality_cap: usize,
    previous: HashMap<String, NetCounters>,
    dropped_total: u64,
}

impl NetworkCollector {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            exclude: default_exclude(),
            include: None,
            cardinality_cap: DEFAULT_CARDINALITY_CAP,
            previous: HashMap::new(),
            dropped_total: 0,
        }
    }

    pub fn with_filters(mut self, exclude: Regex, include: Option<Regex>, cardinality_cap: usize) -> Self {
        self.exclude = exclude;
        self.include = include;
        self.cardinality_cap = cardinality_cap;
        self
    }

    fn passes_filters(&self, name: &str) -> bool {
        if self.exclude.is_match(name) {
            return false;
        }
        match &self.include {
            Some(pattern) => pattern.is_match(name),
            None => true,
        }
    }
}

fn parse_net_dev(text: &str) -> Result<HashMap<String, NetCounters>, CollectorError> {
    let mut interfaces = HashMap::new();
    for line in text.lines().skip(2) {
        let Some((name, rest)) = line.split_once(':') else { continue };
        let name = name.trim().to_string();
        let fields: Vec<&str> = rest.split_whitespace().collect();
        if fields.len() < 16 {
            continue;
        }
        let parse = |i: usize| -> Result<u64, CollectorError> {
            fields[i]
                .parse::<u64>()
                .map_err(|e| parse_error(PROC_NET_DEV, format!("{name} field {i}: {e}")))
        };
        let counters: NetCounters =
            [parse(0)?, parse(1)?, parse(2)?, parse(8)?, parse(9)?, parse(10)?];
        interfaces.insert(name, counters);
    }
    Ok(interfaces)
}

#[async_trait]
impl Collector for NetworkCollector {
    fn name(&self) -> &'static str {
        "network"
    }

    async fn collect(&mut self) -> Result<Vec<Metric>, CollectorError> {
        let text = read_to_string(PROC_NET_DEV).await?;
        let all = parse_net_dev(&text)?;

        let mut filtered: Vec<(String, NetCounters)> =
            all.into_iter().filter(|(name, _)| self.passes_filters(name)).collect();
        filtered.sort_by(|a, b| a.0.cmp(&b.0));

        let dropped_this_tick = filtered.len().saturating_sub(self.cardinality_cap);
        filtered.truncate(self.cardinality_cap);
        self.dropped_total += dropped_this_tick as u64;

        let mut metrics = Vec::new();
        let mut current = HashMap::new();

        for (name, counters) in filtered {
            if let Some(previous) = self.previous.get(&name) {
                for spec in COUNTERS {
                    let now = counters[spec.index];
                    let before = previous[spec.index];
                    if now < before {
                        tracing::warn!(
                            interface = %name,
                            counter = spec.name,
                            delta = now as i64 - before as i64,
                            "network counter went backwards, skipping this tick"
                        );
                        continue;
                    }
                    metrics.push(
                        Metric::numeric(spec.name, now as f64, self.device.clone())
                            .with_tag("interface", name.clone())
                            .finalize(),
                    );
                }
            }
            current.insert(name, counters);
        }

        metrics.push(
            Metric::numeric("network.interfaces_dropped_total", self.dropped_total as f64, self.device.clone())
                .finalize(),
        );

        self.previous = current;
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_exclude_filters_loopback_and_virtual_interfaces() {
        let pattern = default_exclude();
        assert!(pattern.is_match("lo"));
        assert!(pattern.is_match("docker0"));
        assert!(pattern.is_match("veth1a2b3c"));
        assert!(!pattern.is_match("eth0"));
        assert!(!pattern.is_match("wlan0"));
    }

    #[test]
    fn parses_header_and_interface_lines() {
        let text = "Inter-|   Receive                                                |  Transmit\n \
                     face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n \
                     lo: 100 1 0 0 0 0 0 0 100 1 0 0 0 0 0 0\n\
                   eth0: 5000 10 0 0 0 0 0 0 3000 8 0 0 0 0 0 0\n";
        let parsed = parse_net_dev(text).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["eth0"][0], 5000);
        assert_eq!(parsed["eth0"][3], 3000);
    }

    #[tokio::test]
    async fn cardinality_cap_drops_excess_interfaces_and_accumulates_the_count() {
        let device = DeviceId::new("dev");
        let mut collector = NetworkCollector::new(device).with_filters(Regex::new(r"^$").unwrap(), None, 1);
        collector.previous.insert("eth0".to_string(), [0; 6]);
        collector.previous.insert("eth1".to_string(), [0; 6]);

        let mut current = HashMap::new();
        current.insert("eth0".to_string(), [10u64, 1, 0, 10, 1, 0]);
        current.insert("eth1".to_string(), [10u64, 1, 0, 10, 1, 0]);

        let mut filtered: Vec<_> = current.into_iter().collect();
        filtered.sort_by(|a, b| a.0.cmp(&b.0));
        let dropped = filtered.len().saturating_sub(collector.cardinality_cap);
        assert_eq!(dropped, 1);
    }
}
