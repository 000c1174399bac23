//! # Tidewatch CLI
//!
//! The external collaborator responsible for turning a config file plus
//! environment overrides into a validated [`ServiceConfig`], and for the
//! small amount of process-lifecycle bookkeeping (a run-lock guarding
//! against two instances sharing one store) that sits outside
//! `tidewatch-service`'s own task-supervision concerns.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use thiserror::Error;
use tidewatch_api::config::ServiceConfig;
use tidewatch_api::ConfigError;
use tracing::info;

#[derive(Parser)]
#[command(name = "tidewatch-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operate the Tidewatch on-device metrics collector")]
pub struct Cli {
    /// Configuration file path (TOML). Overridden per-field by `TIDEWATCH_*`
    /// environment variables.
    #[arg(short, long, env = "TIDEWATCH_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load, validate, and run the service until SIGINT/SIGTERM.
    Run,
    /// Load and validate configuration without starting anything.
    Validate,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("another instance appears to be running: {0}")]
    AlreadyRunning(String),

    #[error(transparent)]
    Service(#[from] anyhow::Error),
}

/// Merges `path` (TOML) with `TIDEWATCH_*` environment overrides
/// (double-underscore nested, e.g. `TIDEWATCH_STORAGE__BASE_PATH`) into a
/// [`ServiceConfig`]. Does not validate; callers decide when to.
pub fn load_configuration(path: &Path) -> Result<ServiceConfig, CliError> {
    let loaded = config::Config::builder()
        .add_source(config::File::from(path).required(true))
        .add_source(config::Environment::with_prefix("TIDEWATCH").separator("__"))
        .build()?;
    Ok(loaded.try_deserialize()?)
}

/// Advisory run-lock: a file created with `create_new`, so a second
/// instance pointed at the same store fails fast instead of corrupting it
/// through concurrent non-transactional writes.
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(base_path: &Path) -> Result<Self, CliError> {
        let path = lock_path(base_path);
        std::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .map_err(|e| CliError::AlreadyRunning(format!("{} ({e})", path.display())))?;
        Ok(Self { path })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn lock_path(base_path: &Path) -> PathBuf {
    let mut path = base_path.to_path_buf();
    path.set_extension("lock");
    path
}

/// Runs the parsed [`Cli`] to completion.
pub async fn run_cli(cli: Cli) -> Result<(), CliError> {
    let config = load_configuration(&cli.config)?;

    match cli.command {
        Commands::Validate => {
            config.validate()?;
            info!(device_id = %config.device_id, "configuration is valid");
            Ok(())
        }
        Commands::Run => {
            config.validate()?;
            let _lock = RunLock::acquire(&config.storage.base_path)?;

            let shutdown = async {
                let ctrl_c = tokio::signal::ctrl_c();
                #[cfg(unix)]
                {
                    let mut terminate =
                        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_lock_rejects_a_second_acquisition() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("tidewatch.db");
        let lock = RunLock::acquire(&base).unwrap();
        assert!(RunLock::acquire(&base).is_err());
        drop(lock);
        assert!(RunLock::acquire(&base).is_ok());
    }

    #[test]
    fn loading_a_missing_config_file_fails() {
        let result = load_configuration(Path::new("/nonexistent/tidewatch.toml"));
        assert!(result.is_err());
    }
}
