//! Conkit - Containerization Assistant
//!
//! CLI entry point for session administration.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod cli;
mod config;
mod logging;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();
    let config = config::load_config()?;
    let _guard = logging::init(&config.logging)?;

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        backend = %config.sessions.store.backend,
        "Conkit starting"
    );

    cli::run(cli, config).await
}
