//! CLI configuration commands
//!
//! Provides `conkit config {show,defaults}` for viewing the layered
//! configuration the other commands run with.

use crate::config::{AppConfig, DEFAULT_CONFIG};
use anyhow::{Context, Result};
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration (files + environment)
    Show {
        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
    /// Print the built-in defaults
    Defaults,
}

pub fn run(cmd: ConfigCommands, config: &AppConfig) -> Result<()> {
    match cmd {
        ConfigCommands::Show { json } => cmd_show(config, json),
        ConfigCommands::Defaults => {
            print!("{}", DEFAULT_CONFIG);
            Ok(())
        }
    }
}

fn cmd_show(config: &AppConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    let manager = config.manager_config();
    println!("# data_dir resolves to {}", config.data_dir().display());
    println!("# workspaces resolve to {}", manager.workspace_dir.display());
    if config.sessions.store.backend == "sqlite" {
        println!(
            "# sqlite database resolves to {}",
            config
                .sessions
                .store
                .resolve_sqlite_path(&config.data_dir())
                .display()
        );
    }
    println!(
        "# tool retries: {} attempts",
        config.workflow_config().tool_retry.max_attempts
    );
    println!();
    print!(
        "{}",
        toml::to_string_pretty(config).context("Failed to serialize config")?
    );
    Ok(())
}
