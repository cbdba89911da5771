mod commands;
mod config;
mod error;
mod exec;
mod routes;
mod target;
mod transport;

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use config::{CliArgs, Command, Config};
use error::AppError;
use transport::OpenSshTransport;

#[tokio::main]
async fn main() -> ExitCode {
    let cli_args = CliArgs::parse();

    let config = match Config::load(&cli_args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ExitCode::from(2);
        }
    };

    // RUST_LOG directives apply unless --log-level was given
    let filter = match (&cli_args.log_level, EnvFilter::try_from_default_env()) {
        (None, Ok(env_filter)) => env_filter,
        _ => EnvFilter::new(config.log_level.as_str().to_lowercase()),
    };

    // Logs go to stderr; stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    if let Some(path) = &config.config_file {
        tracing::info!("Loaded configuration from: {}", path.display());
    }
    tracing::debug!("Using routes file {}", config.routes_file.display());

    let transport = OpenSshTransport::new(config.ssh.clone());

    let result = match &cli_args.command {
        Command::Resolve { target, json } => commands::resolve_target(&config, target, *json)
            .await
            .map(|_| true),
        Command::List { probe } => commands::list_routes(&config, &transport, *probe)
            .await
            .map(|_| true),
        Command::Exec(args) => commands::exec_on_target(&config, &transport, args).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => report_error(&e),
    }
}

fn report_error(e: &AppError) -> ExitCode {
    tracing::error!("{}", e);
    eprintln!("Error: {}", e.user_message());
    if e.is_recoverable() {
        ExitCode::FAILURE
    } else {
        ExitCode::from(2)
    }
}
