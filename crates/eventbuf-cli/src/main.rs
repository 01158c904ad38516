//! `eventbuf` binary: operator access to a durable event buffer.
//!
//! Loads configuration, initialises structured logging on stderr, runs one
//! subcommand, and prints its result on stdout.

mod args;
mod commands;
mod config;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::args::Cli;

const DEFAULT_CONFIG_PATH: &str = "eventbuf.toml";

fn init_tracing(logging: &config::LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());

    let config = match config::load_config(Some(config_path.as_path())) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("eventbuf: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.logging);
    tracing::debug!(
        path = %config_path.display(),
        db = %config.database.path,
        "resolved configuration"
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match commands::run(&cli.command, &config, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}
