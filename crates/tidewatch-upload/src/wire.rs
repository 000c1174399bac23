//! Wire encoding: name sanitization and JSON-lines construction. Never
//! touches the stored `name` — only the bytes that leave the process.

use serde_json::{json, Map, Value};
use tidewatch_core::Metric;

/// Metric name families that already carry a canonical suffix; `_celsius`,
/// `_percent`, `_bytes`, `_ms_total`, `_total` and `_ops_total` endings are
/// all produced directly by the collectors in this codebase, so this table
/// only exists for names arriving without one.
const UNIT_SUFFIX_TABLE: &[(&str, &str)] = &[("cpu_temperature", "_celsius"), ("temperature", "_celsius")];

/// Replaces `.` with `_`, replaces any character outside `[A-Za-z0-9_:]`
/// with `_`, and appends a canonical unit suffix when the name is a known
/// family without one already.
pub fn sanitize_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if c == '.' { '_' } else if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect();

    for (family, suffix) in UNIT_SUFFIX_TABLE {
        if replaced == *family {
            return format!("{replaced}{suffix}");
        }
    }
    replaced
}

fn metric_line(metric: &Metric) -> Value {
    let mut tags = Map::new();
    tags.insert("__name__".to_string(), Value::String(sanitize_name(&metric.name)));
    tags.insert("device_id".to_string(), Value::String(metric.device_id.as_str().to_string()));
    for (key, value) in &metric.tags {
        tags.insert(key.clone(), Value::String(value.clone()));
    }

    json!({
        "metric": tags,
        "values": [metric.value_numeric.unwrap_or(0.0)],
        "timestamps": [metric.timestamp_ms],
    })
}

/// Encodes a chunk as newline-delimited JSON, one line per row, sorted by
/// timestamp ascending by the caller before this runs.
pub fn encode_chunk(metrics: &[Metric]) -> Vec<u8> {
    let mut buf = Vec::new();
    for metric in metrics {
        let line = metric_line(metric);
        serde_json::to_writer(&mut buf, &line).expect("metric line encoding never fails");
        buf.push(b'\n');
    }
    buf
}

/// Content-Type sent with every POST. `application/x-ndjson` is the most
/// widely recognized newline-delimited-JSON convention among
/// Prometheus-remote-write-compatible receivers.
pub const CONTENT_TYPE: &str = "application/x-ndjson";
