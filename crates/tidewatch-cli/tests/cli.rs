//! Exercises the actual binary, not just `run_cli`, so CLI argument
//! parsing and exit codes are covered too.

use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn validate_fails_fast_against_a_missing_config_file() {
    Command::cargo_bin("tidewatch-cli")
        .unwrap()
        .args(["--config", "/nonexistent/tidewatch.toml", "validate"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn validate_rejects_a_config_missing_required_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tidewatch.toml");
    std::fs::write(
        &path,
        r#"
            device_id = ""

            [http]
            host = "0.0.0.0"
            port = 9090

            [storage]
            base_path = ""

            [upload]
            url = ""

            [collectors.cpu]
            enabled = true
            interval_secs = 10

            [collectors.disk]
            enabled = true
            interval_secs = 15

            [collectors.network]
            enabled = true
            interval_secs = 15

            [collectors.memory]
            enabled = true
            interval_secs = 15

            [collectors.temperature]
            enabled = true
            interval_secs = 30
        "#,
    )
    .unwrap();

    Command::cargo_bin("tidewatch-cli")
        .unwrap()
        .args(["--config", path.to_str().unwrap(), "validate"])
        .assert()
        .failure()
        .stdout(contains("device_id"));
}
