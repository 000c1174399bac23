//! Clock skew against a dedicated health endpoint's `Date` header.
//!
//! Issued against the upload engine's shared `reqwest::Client` rather than
//! a second connection pool, and against a distinct health URL: some
//! proxies echo proxy time rather than origin time on the ingest path, and
//! some ingest endpoints reject GET entirely.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tidewatch_core::{DeviceId, Metric};

use crate::collector::Collector;
use crate::error::CollectorError;

const DEFAULT_WARN_THRESHOLD_MS: i64 = 2_000;
const WARN_RATE_LIMIT: Duration = Duration::from_secs(300);

pub struct ClockSkewCollector {
    device: DeviceId,
    client: reqwest::Client,
    url: String,
    auth_token: String,
    warn_threshold_ms: i64,
    last_warned_at: Option<Instant>,
}

impl ClockSkewCollector {
    pub fn new(device: DeviceId, client: reqwest::Client, url: String, auth_token: String) -> Self {
        Self {
            device,
            client,
            url,
            auth_token,
            warn_threshold_ms: DEFAULT_WARN_THRESHOLD_MS,
            last_warned_at: None,
        }
    }

    pub fn with_warn_threshold_ms(mut self, threshold_ms: i64) -> Self {
        self.warn_threshold_ms = threshold_ms;
        self
    }

    fn maybe_warn(&mut self, skew_ms: i64) {
        if skew_ms.abs() <= self.warn_threshold_ms {
            return;
        }
        let should_warn = match self.last_warned_at {
            Some(at) => at.elapsed() >= WARN_RATE_LIMIT,
            None => true,
        };
        if should_warn {
            tracing::warn!(skew_ms, threshold_ms = self.warn_threshold_ms, "clock skew exceeds threshold");
            self.last_warned_at = Some(Instant::now());
        }
    }
}

#[async_trait]
impl Collector for ClockSkewCollector {
    fn name(&self) -> &'static str {
        "clock_skew"
    }

    async fn collect(&mut self) -> Result<Vec<Metric>, CollectorError> {
        let local_before = Utc::now();
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(|e| CollectorError::Http { url: self.url.clone(), message: e.to_string() })?;
        let local_after = Utc::now();

        let date_header = response
            .headers()
            .get(reqwest::header::DATE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| CollectorError::Http {
                url: self.url.clone(),
                message: "response carried no Date header".to_string(),
            })?
            .to_string();

        let server_date: DateTime<Utc> = DateTime::parse_from_rfc2822(&date_header)
            .map_err(|e| CollectorError::Parse { source: "Date header".to_string(), message: e.to_string() })?
            .with_timezone(&Utc);

        let rtt = local_after - local_before;
        let midpoint = local_before + rtt / 2;
        let skew_ms = (midpoint - server_date).num_milliseconds();

        self.maybe_warn(skew_ms);

        Ok(vec![Metric::numeric("time.skew_ms", skew_ms as f64, self.device.clone()).finalize()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc2822_date_header_parses() {
        let parsed = DateTime::parse_from_rfc2822("Tue, 15 Nov 1994 08:12:31 GMT").unwrap();
        assert_eq!(parsed.with_timezone(&Utc).timestamp(), 784887151);
    }

    #[test]
    fn warn_rate_limiting_suppresses_repeat_warnings_within_window() {
        let device = DeviceId::new("dev");
        let client = reqwest::Client::new();
        let mut collector = ClockSkewCollector::new(device, client, "http://example".into(), "token".into());

        assert!(collector.last_warned_at.is_none());
        collector.maybe_warn(5_000);
        assert!(collector.last_warned_at.is_some());
        let first = collector.last_warned_at;
        collector.maybe_warn(5_000);
        assert_eq!(collector.last_warned_at, first);
    }

    #[test]
    fn skew_within_threshold_does_not_warn() {
        let device = DeviceId::new("dev");
        let client = reqwest::Client::new();
        let mut collector = ClockSkewCollector::new(device, client, "http://example".into(), "token".into());
        collector.maybe_warn(100);
        assert!(collector.last_warned_at.is_none());
    }
}
