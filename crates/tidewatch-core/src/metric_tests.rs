//! Tests for metric construction and dedup-key derivation (S.8 invariants 5, 6).

use super::*;

fn device() -> DeviceId {
    DeviceId::new("sbc-0001")
}

#[test]
fn tag_insertion_order_does_not_affect_dedup_key() {
    let a = Metric::numeric("cpu.usage", 42.0, device())
        .with_tag("core", "0")
        .with_tag("zone", "a")
        .finalize();

    let b = Metric::numeric("cpu.usage", 42.0, device())
        .with_tag("zone", "a")
        .with_tag("core", "0")
        .finalize();

    assert_eq!(a.timestamp_ms, b.timestamp_ms, "test assumes same tick");
    assert_eq!(a.dedup_key, b.dedup_key);
}

#[test]
fn value_type_change_changes_dedup_key() {
    let now = Utc::now();
    let numeric = Metric::numeric("collector.status", 1.0, device())
        .with_timestamp(now)
        .finalize();
    let string = Metric::string("collector.status", "error", device())
        .with_timestamp(now)
        .finalize();

    assert_ne!(numeric.dedup_key, string.dedup_key);
}

#[test]
fn future_timestamp_beyond_ceiling_is_clamped_to_now() {
    let far_future = Utc::now() + chrono::Duration::hours(2);
    let metric = Metric::numeric("disk.read_bytes_total", 10.0, device())
        .with_timestamp(far_future)
        .finalize();

    let now_ms = Utc::now().timestamp_millis();
    assert!((now_ms - metric.timestamp_ms).abs() < 5_000);
}

#[test]
fn past_timestamp_within_window_is_preserved() {
    let ten_minutes_ago = Utc::now() - chrono::Duration::minutes(10);
    let metric = Metric::numeric("network.rx_bytes_total", 10.0, device())
        .with_timestamp(ten_minutes_ago)
        .finalize();

    assert_eq!(metric.timestamp_ms, ten_minutes_ago.timestamp_millis());
}

#[test]
fn string_metrics_carry_no_numeric_value() {
    let metric = Metric::string("upload.last_error", "connection refused", device()).finalize();
    assert!(metric.value_numeric.is_none());
    assert_eq!(metric.value_text.as_deref(), Some("connection refused"));
    assert!(!metric.is_numeric());
}

#[test]
fn default_priority_is_stable_across_builds() {
    let a = Metric::numeric("x", 1.0, device()).finalize();
    let b = Metric::numeric("x", 1.0, device()).with_priority(5).finalize();
    assert_eq!(a.priority, DEFAULT_PRIORITY);
    assert_eq!(b.priority, 5);
}
