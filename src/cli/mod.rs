//! CLI module for Conkit
//!
//! Provides admin commands:
//! - `sessions`: Inspect, label, delete and garbage-collect sessions
//! - `config`: Show the effective configuration

use crate::config::AppConfig;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use conkit_core::{SessionStatus, SortBy};

pub mod config;
pub mod sessions;

/// Conkit containerization assistant CLI
#[derive(Parser, Debug)]
#[command(name = "conkit")]
#[command(about = "Session administration for the containerization assistant")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage persisted sessions
    #[command(subcommand)]
    Sessions(SessionCommands),
    /// Inspect configuration
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// List sessions matching a query
    List(ListArgs),
    /// Show one session and its conversation
    Show {
        /// Session id
        id: String,
        /// Print the raw record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a session, its record and its workspace
    Delete {
        /// Session id
        id: String,
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
    /// Remove expired sessions, orphan workspaces and stale records
    Gc,
    /// Show session counts and disk usage
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add or remove labels
    Label {
        /// Session id
        id: String,
        /// Labels to add
        #[arg(long = "add", value_name = "LABEL")]
        add: Vec<String>,
        /// Labels to remove
        #[arg(long = "remove", value_name = "LABEL")]
        remove: Vec<String>,
        /// Kubernetes-style label (key=value)
        #[arg(long = "k8s", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        k8s: Vec<(String, String)>,
    },
}

/// Filters for `sessions list`
#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Session must carry every label given
    #[arg(short, long = "label", value_name = "LABEL")]
    pub labels: Vec<String>,
    /// Session must carry at least one of these labels
    #[arg(long = "any-label", value_name = "LABEL")]
    pub any_labels: Vec<String>,
    /// Kubernetes-style label that must match (key=value)
    #[arg(long = "k8s", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub k8s_labels: Vec<(String, String)>,
    /// active, expired or quota_exceeded
    #[arg(long, value_parser = parse_status)]
    pub status: Option<SessionStatus>,
    /// Exact repository URL
    #[arg(long)]
    pub repo_url: Option<String>,
    /// Only sessions with (true) or without (false) a recorded tool error
    #[arg(long)]
    pub has_error: Option<bool>,
    /// Only sessions with (true) or without (false) running jobs
    #[arg(long)]
    pub has_active_jobs: Option<bool>,
    /// Created after (RFC 3339)
    #[arg(long)]
    pub created_after: Option<DateTime<Utc>>,
    /// Created before (RFC 3339)
    #[arg(long)]
    pub created_before: Option<DateTime<Utc>>,
    /// Accessed after (RFC 3339)
    #[arg(long)]
    pub accessed_after: Option<DateTime<Utc>>,
    /// Accessed before (RFC 3339)
    #[arg(long)]
    pub accessed_before: Option<DateTime<Utc>>,
    /// Sort key: created, accessed or expires
    #[arg(long, default_value = "accessed")]
    pub sort: SortBy,
    /// Oldest first
    #[arg(long)]
    pub asc: bool,
    /// Matches to skip
    #[arg(long, default_value_t = 0)]
    pub offset: i64,
    /// Page size (0 for all)
    #[arg(long, default_value_t = 20)]
    pub limit: i64,
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn parse_status(s: &str) -> Result<SessionStatus, String> {
    match s.to_lowercase().replace('-', "_").as_str() {
        "active" => Ok(SessionStatus::Active),
        "expired" => Ok(SessionStatus::Expired),
        "quota_exceeded" => Ok(SessionStatus::QuotaExceeded),
        other => Err(format!(
            "unknown status '{}', use active, expired or quota_exceeded",
            other
        )),
    }
}

/// Run the CLI command
pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Sessions(cmd)) => sessions::run(cmd, &config).await,
        Some(Commands::Config(cmd)) => config::run(cmd, &config),
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        <Cli as clap::CommandFactory>::command().debug_assert();
    }

    #[test]
    fn test_list_flags() {
        let cli = Cli::try_parse_from([
            "conkit", "sessions", "list", "-l", "env:prod", "--k8s", "app=web", "--status",
            "quota-exceeded", "--sort", "created", "--asc", "--limit", "5",
        ])
        .unwrap();

        let Some(Commands::Sessions(SessionCommands::List(args))) = cli.command else {
            panic!("expected sessions list");
        };
        assert_eq!(args.labels, vec!["env:prod"]);
        assert_eq!(args.k8s_labels, vec![("app".to_string(), "web".to_string())]);
        assert_eq!(args.status, Some(SessionStatus::QuotaExceeded));
        assert_eq!(args.sort, SortBy::Created);
        assert!(args.asc);
        assert_eq!(args.limit, 5);
    }

    #[test]
    fn test_label_flags() {
        let cli = Cli::try_parse_from([
            "conkit", "sessions", "label", "s1", "--add", "team:web", "--add", "env:prod",
            "--remove", "old",
        ])
        .unwrap();

        let Some(Commands::Sessions(SessionCommands::Label { id, add, remove, k8s })) =
            cli.command
        else {
            panic!("expected sessions label");
        };
        assert_eq!(id, "s1");
        assert_eq!(add, vec!["team:web", "env:prod"]);
        assert_eq!(remove, vec!["old"]);
        assert!(k8s.is_empty());
    }

    #[test]
    fn test_rejects_bad_key_value() {
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
        assert_eq!(
            parse_key_value("tier=").unwrap(),
            ("tier".to_string(), String::new())
        );
    }
}
