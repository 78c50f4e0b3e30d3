//! Carousel CLI
//!
//! Runs the carousel pipeline against a Google Sheet or free text and keeps
//! a registry of runs.

mod args;
mod commands;
mod output;
mod references;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use args::{Cli, Command};

/// `RUST_LOG` wins, then `LOG_LEVEL`, then `info`. `--verbose` forces debug.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
            EnvFilter::try_new(level.to_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"))
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let result = match &cli.command {
        Command::Sheet(args) => commands::sheet(&cli.global, args).await,
        Command::Text(args) => commands::text(&cli.global, args).await,
        Command::Jobs(command) => commands::jobs(&cli.global, command),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Run failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
