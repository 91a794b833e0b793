//! `ghd`: turn-based discussions between agents, anchored to a GitHub issue.
//!
//! Results go to stdout; progress, logs and errors go to stderr. A failure
//! prints `[CODE] message` and exits non-zero.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod command;
mod format;

/// Log filter variable (`GHD_LOG=debug`).
const LOG_ENV: &str = "GHD_LOG";

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| "warn".into()))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = cli::Cli::parse();

    match command::execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "Command failed");
            eprintln!("{}", format::error(&err));
            ExitCode::FAILURE
        }
    }
}
