//! The drain loop: query unuploaded rows, chunk them, gzip, POST, retry.
//!
//! Mirrors the shape of this codebase's other retry loop (attempt, classify,
//! backoff-and-continue or give up) but chunk-scoped rather than
//! event-scoped, and atomic at the chunk level: a chunk's rows are marked
//! uploaded only after a 2xx for that exact chunk.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use flate2::write::GzEncoder;
use flate2::Compression;
use tidewatch_core::{Metric, Store};
use tidewatch_health::MetaMetrics;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{UploadConfig, CHUNK_BYTE_CEILING};
use crate::error::UploadError;
use crate::retry::{self, RetryPolicy, RetryState, Retryability};
use crate::wire;

pub struct UploadEngine {
    store: Arc<dyn Store>,
    client: reqwest::Client,
    config: UploadConfig,
    meta: Arc<MetaMetrics>,
}

#[derive(Debug, Default)]
pub struct DrainReport {
    pub chunks_sent: usize,
    pub rows_uploaded: usize,
    pub chunks_abandoned: usize,
}

enum SendOutcome {
    Retryable { status: u16, retry_after: Option<Duration>, bytes_rcvd: u64, error: String },
    NonRetryable { status: u16, bytes_rcvd: u64, error: String },
}

impl UploadEngine {
    pub fn new(store: Arc<dyn Store>, config: UploadConfig, meta: Arc<MetaMetrics>) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self { store, client, config, meta })
    }

    /// The shared client, handed to the clock-skew collector rather than
    /// opening a second connection pool.
    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }

    pub async fn drain_once(&self) -> Result<DrainReport, UploadError> {
        let rows = self.store.query_unuploaded(self.config.batch_size).await?;
        if rows.is_empty() {
            return Ok(DrainReport::default());
        }

        let batch_id = Uuid::new_v4().to_string();
        let chunks = chunk_rows(rows, self.config.chunk_size);
        let policy = self.config.retry.resolve();

        let mut report = DrainReport::default();

        for (chunk_index, mut chunk) in chunks.into_iter().enumerate() {
            if chunk.is_empty() {
                continue;
            }
            chunk.sort_by_key(|m| m.timestamp_ms);

            if self.send_chunk_with_retry(&batch_id, chunk_index as u32, &chunk, &policy).await {
                let ids: Vec<i64> = chunk.iter().filter_map(|m| m.storage_id).collect();
                self.store.mark_uploaded(&ids).await?;
                report.chunks_sent += 1;
                report.rows_uploaded += ids.len();
            } else {
                report.chunks_abandoned += 1;
            }
        }

        Ok(report)
    }

    /// Returns `true` if the chunk was accepted (rows should be marked
    /// uploaded), `false` if it was abandoned.
    async fn send_chunk_with_retry(&self, batch_id: &str, chunk_index: u32, chunk: &[Metric], policy: &RetryPolicy) -> bool {
        let mut state = RetryState::new();
        loop {
            let started = Instant::now();
            let outcome = self.send_chunk(chunk).await;
            let duration = started.elapsed();

            match outcome {
                Ok((bytes_sent, bytes_rcvd)) => {
                    self.meta.record_upload(true, chunk.len(), duration);
                    info!(
                        batch_id,
                        chunk_index,
                        attempt = state.total_attempts,
                        http_status = 200,
                        bytes_sent,
                        bytes_rcvd,
                        duration_ms = duration.as_millis() as u64,
                        "chunk uploaded"
                    );
                    return true;
                }
                Err(SendOutcome::Retryable { status, retry_after, bytes_rcvd, error }) => {
                    self.meta.record_upload(false, 0, duration);
                    if state.can_retry(policy) {
                        let delay = state.get_delay(policy, retry_after);
                        warn!(
                            batch_id,
                            chunk_index,
                            attempt = state.total_attempts,
                            http_status = status,
                            bytes_rcvd,
                            backoff_ms = delay.as_millis() as u64,
                            error,
                            "retrying chunk upload"
                        );
                        tokio::time::sleep(delay).await;
                        state.next_attempt();
                        continue;
                    }
                    warn!(batch_id, chunk_index, attempt = state.total_attempts, http_status = status, error, "abandoning chunk after exhausting retries");
                    return false;
                }
                Err(SendOutcome::NonRetryable { status, bytes_rcvd, error }) => {
                    self.meta.record_upload(false, 0, duration);
                    warn!(batch_id, chunk_index, http_status = status, bytes_rcvd, error, "abandoning chunk: non-retryable response");
                    return false;
                }
            }
        }
    }

    async fn send_chunk(&self, chunk: &[Metric]) -> Result<(u64, u64), SendOutcome> {
        let body = wire::encode_chunk(chunk);
        let compressed = gzip(&body).map_err(|e| SendOutcome::Retryable {
            status: 0,
            retry_after: None,
            bytes_rcvd: 0,
            error: e.to_string(),
        })?;
        let bytes_sent = compressed.len() as u64;

        let mut request = self
            .client
            .post(&self.config.url)
            .header(reqwest::header::CONTENT_TYPE, self.config.content_type())
            .header(reqwest::header::CONTENT_ENCODING, "gzip")
            .body(compressed);
        if !self.config.auth_token.is_empty() {
            request = request.bearer_auth(&self.config.auth_token);
        }

        let response = request.send().await.map_err(|e| SendOutcome::Retryable {
            status: 0,
            retry_after: None,
            bytes_rcvd: 0,
            error: e.to_string(),
        })?;

        let status = response.status();
        let retry_after_header = retry::retry_after(response.headers(), status.as_u16());
        let bytes_rcvd = response.content_length().unwrap_or(0);

        if status.is_success() {
            return Ok((bytes_sent, bytes_rcvd));
        }

        let body_text = response.text().await.unwrap_or_default();
        match retry::classify_status(status.as_u16()) {
            Retryability::Retryable => Err(SendOutcome::Retryable {
                status: status.as_u16(),
                retry_after: retry_after_header,
                bytes_rcvd,
                error: body_text,
            }),
            Retryability::NonRetryable => {
                Err(SendOutcome::NonRetryable { status: status.as_u16(), bytes_rcvd, error: body_text })
            }
        }
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Groups rows into `chunk_size`-row chunks, then over-splits any chunk
/// whose encoded (pre-gzip) size would exceed the byte ceiling. Checking
/// the uncompressed size against the compressed-size ceiling is
/// deliberately conservative: gzip only shrinks, so a chunk passing this
/// check always satisfies the actual compressed-size contract too.
fn chunk_rows(rows: Vec<Metric>, chunk_size: usize) -> Vec<Vec<Metric>> {
    let mut chunks = Vec::new();
    for base_chunk in rows.chunks(chunk_size.max(1)) {
        let mut current: Vec<Metric> = Vec::new();
        let mut current_size = 0usize;
        for metric in base_chunk {
            let encoded_size = wire::encode_chunk(std::slice::from_ref(metric)).len();
            if !current.is_empty() && current_size + encoded_size > CHUNK_BYTE_CEILING {
                chunks.push(std::mem::take(&mut current));
                current_size = 0;
            }
            current_size += encoded_size;
            current.push(metric.clone());
        }
        if !current.is_empty() {
            chunks.push(current);
        }
    }
    chunks
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
