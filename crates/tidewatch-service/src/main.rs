//! Binary entrypoint for the Tidewatch on-device metrics collector.
//!
//! Richer configuration loading (TOML/YAML/env merging, process lifecycle
//! helpers like a run-lock) lives in `tidewatch-cli`, which is the
//! preferred way to operate this service. This entrypoint is the minimal
//! standalone path: a single config file, read straight off disk.

use std::path::PathBuf;

use tidewatch_api::config::ServiceConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "tidewatch_service=info,tidewatch_collect=info,tidewatch_upload=info,tidewatch_health=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("TIDEWATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/etc/tidewatch/config.toml"));

    let config = load_config(&config_path)?;
    config.validate()?;

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
    };

    tidewatch_service::run(config, shutdown).await?;
    Ok(())
}

fn load_config(path: &PathBuf) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read config file {}: {e}", path.display()))?;
    let config: ServiceConfig = toml::from_str(&contents)
        .map_err(|e| format!("failed to parse config file {}: {e}", path.display()))?;
    Ok(config)
}
