//! # Main Entry Point
//!
//! Parses the command line, wires up logging (console plus a session log
//! file under the data directory), and dispatches to the command handlers.

mod cli;
mod commands;
mod config;
mod llm;
mod paths;
mod processor;
mod tasks;
mod templates;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let _guard = init_logging()?;
    commands::run(cli).await
}

/// Console logging to stderr (stdout stays clean for results) plus a
/// persistent session log in the data directory.
fn init_logging() -> Result<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let log_dir = paths::data_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create data directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(&log_dir, paths::SESSION_LOG);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hyper=warn,reqwest=warn"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(guard)
}
