mod config;
mod logging;
mod statsd;

use clap::{Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig};
use logging::LoggingError;
use statsd::MetricsError;
use std::path::PathBuf;
use std::process::ExitCode;
use tunnel::errors::TunnelError;

#[derive(Parser)]
#[command(about = "Relays Sentry envelopes from many applications to their upstream projects")]
struct Cli {
    /// Settings file. Searched for in ., ~/.sentinel and /etc/sentinel when omitted.
    #[arg(long, global = true)]
    config_file_path: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the tunnel until interrupted
    Run,
    /// Validate the settings file and print what would be served
    CheckConfig,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error("could not start runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("could not listen for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
    #[error(transparent)]
    Tunnel(#[from] TunnelError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "sentinel failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<(), CliError> {
    let path = config::locate(cli.config_file_path.as_deref())?;
    let config = Config::from_file(&path)?;

    match cli.command {
        CliCommand::CheckConfig => {
            let tunnel_config = config.tunnel_config()?;
            println!("config file: {}", path.display());
            print!("{}", config::summary(&tunnel_config));
            Ok(())
        }
        CliCommand::Run => {
            let default_logging = LoggingConfig::default();
            let logging_config = config.common.logging.as_ref().unwrap_or(&default_logging);
            let _sentry = logging::init(logging_config)?;
            if let Some(metrics_config) = &config.common.metrics {
                statsd::init(metrics_config)?;
            }
            tracing::info!(path = %path.display(), "loaded config");

            let tunnel_config = config.tunnel_config()?;
            serve(tunnel_config)
        }
    }
}

fn serve(config: tunnel::config::Config) -> Result<(), CliError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime.block_on(async {
        tokio::select! {
            result = tunnel::run(config) => result.map_err(CliError::from),
            signal = tokio::signal::ctrl_c() => {
                tracing::info!("received interrupt, shutting down");
                signal.map_err(CliError::Signal)
            }
        }
    })
}
