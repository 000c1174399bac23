//! Retry policy and state for chunk uploads.
//!
//! The `RetryPolicy`/`RetryState` split follows the shape used elsewhere in
//! this codebase for other retry loops: a policy is immutable configuration,
//! state is the mutable per-operation counter. The backoff curve itself
//! differs from that sibling (multiplicative jitter, not additive) and
//! layers in a `Retry-After` override, both specific to the upload wire
//! contract.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use reqwest::header::HeaderMap;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first, non-retry one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub jitter_percent: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(16),
            multiplier: 2.0,
            jitter_percent: 0.20,
        }
    }
}

impl RetryPolicy {
    /// A policy with retries switched off: only the first attempt is made.
    pub fn disabled() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// `delay(n) = min(max_backoff, initial_backoff * multiplier^(n-1))`,
    /// then scaled by a uniform factor in `[1-jitter, 1+jitter]`.
    pub fn calculate_delay(&self, retry_number: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(retry_number.saturating_sub(1) as i32);
        let capped = base.min(self.max_backoff.as_secs_f64());
        let mut rng = rand::rng();
        let factor = rng.random_range((1.0 - self.jitter_percent)..=(1.0 + self.jitter_percent));
        Duration::from_secs_f64((capped * factor).max(0.0))
    }

    pub fn should_retry(&self, total_attempts: u32) -> bool {
        total_attempts < self.max_attempts
    }
}

#[derive(Debug, Clone)]
pub struct RetryState {
    pub attempt: u32,
    pub total_attempts: u32,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    pub fn new() -> Self {
        Self { attempt: 0, total_attempts: 1 }
    }

    pub fn next_attempt(&mut self) {
        self.attempt += 1;
        self.total_attempts += 1;
    }

    pub fn can_retry(&self, policy: &RetryPolicy) -> bool {
        policy.should_retry(self.total_attempts)
    }

    /// The policy's computed delay, overridden by a server `Retry-After`
    /// when present: `max(computed, retry_after)`.
    pub fn get_delay(&self, policy: &RetryPolicy, retry_after: Option<Duration>) -> Duration {
        let computed = policy.calculate_delay(self.attempt + 1);
        match retry_after {
            Some(server_delay) => computed.max(server_delay),
            None => computed,
        }
    }
}

/// Whether an outcome should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    Retryable,
    NonRetryable,
}

/// Classifies an HTTP status per the retry contract: transport-level
/// failures (no status at all) are always retryable and handled by the
/// caller before this is reached.
pub fn classify_status(status: u16) -> Retryability {
    match status {
        408 | 429 | 500..=504 => Retryability::Retryable,
        _ => Retryability::NonRetryable,
    }
}

/// Parses a `Retry-After` header, honored only for 429/503: either an
/// integer seconds count or an HTTP-date.
pub fn retry_after(headers: &HeaderMap, status: u16) -> Option<Duration> {
    if status != 429 && status != 503 {
        return None;
    }
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    if let Ok(seconds) = raw.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let target = chrono::DateTime::parse_from_rfc2822(raw.trim()).ok()?;
    let now = Utc::now();
    let delta = target.with_timezone(&Utc) - now;
    delta.to_std().ok()
}
