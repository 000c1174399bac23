use clap::Parser;
use tidewatch_cli::{run_cli, Cli, CliError};
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "tidewatch_cli=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run_cli(cli).await {
        error!("{e}");

        let exit_code = match e {
            CliError::Configuration(_) | CliError::Load(_) => 1,
            CliError::AlreadyRunning(_) => 2,
            CliError::Service(_) => 3,
        };

        std::process::exit(exit_code);
    }
}
