//! Configuration loading
//!
//! Layers, lowest priority first: the embedded `config/default.toml`, optional
//! `config/default`, `config/{CONKIT_ENV}` and `config/local` files, then
//! `CONKIT_<SECTION>__<KEY>` environment variables.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use conkit_core::{RetryPolicy, SessionManagerConfig, StoreConfig};
use conkit_workflow::{UserPreferences, WorkflowConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root for the session database and workspaces; `~/.conkit` when unset
    pub data_dir: Option<String>,
    pub sessions: SessionsConfig,
    pub workflow: WorkflowSettings,
    /// Preferences for users with nothing saved
    pub preferences: UserPreferences,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Resolved data directory
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) if !dir.trim().is_empty() => expand_home(dir),
            _ => dirs::home_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(".conkit"),
        }
    }

    /// Session manager settings with workspaces under the data directory
    /// unless `sessions.workspace_dir` says otherwise
    pub fn manager_config(&self) -> SessionManagerConfig {
        let s = &self.sessions;
        let workspace_dir = match &s.workspace_dir {
            Some(dir) if !dir.trim().is_empty() => expand_home(dir),
            _ => self.data_dir().join("workspaces"),
        };
        SessionManagerConfig::new(workspace_dir)
            .with_max_sessions(s.max_sessions)
            .with_ttl(chrono::Duration::seconds(
                i64::try_from(s.ttl_seconds).unwrap_or(i64::MAX / 1000),
            ))
            .with_disk_limits(
                s.max_disk_per_session_mb.saturating_mul(MIB),
                s.total_disk_limit_mb.saturating_mul(MIB),
            )
            .with_store_retention(s.store.retention())
    }

    /// Engine settings
    pub fn workflow_config(&self) -> WorkflowConfig {
        let w = &self.workflow;
        WorkflowConfig::new()
            .with_max_auto_advance_steps(w.max_auto_advance_steps)
            .with_preflight(w.require_preflight)
            .with_deployment_retries(
                w.deployment_max_retries,
                Duration::from_millis(w.deployment_retry_delay_ms),
            )
            .with_tool_retry(w.tool_retry.policy())
    }
}

const MIB: u64 = 1024 * 1024;

pub(crate) fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// `[sessions]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Workspace root; `<data_dir>/workspaces` when unset
    pub workspace_dir: Option<String>,
    pub max_sessions: usize,
    pub ttl_seconds: u64,
    pub max_disk_per_session_mb: u64,
    /// Zero disables the combined limit
    pub total_disk_limit_mb: u64,
    pub store: StoreConfig,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            workspace_dir: None,
            max_sessions: 100,
            ttl_seconds: 24 * 3600,
            max_disk_per_session_mb: 1024,
            total_disk_limit_mb: 10 * 1024,
            store: StoreConfig::default(),
        }
    }
}

/// `[workflow]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub max_auto_advance_steps: usize,
    pub require_preflight: bool,
    pub deployment_max_retries: u32,
    pub deployment_retry_delay_ms: u64,
    pub tool_retry: ToolRetrySettings,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_auto_advance_steps: 5,
            require_preflight: false,
            deployment_max_retries: 3,
            deployment_retry_delay_ms: 2000,
            tool_retry: ToolRetrySettings::default(),
        }
    }
}

/// `[workflow.tool_retry]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolRetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for ToolRetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ToolRetrySettings {
    /// Retry policy for transient tool failures
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(self.max_attempts)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_backoff_multiplier(self.multiplier)
            .with_jitter(self.jitter)
    }
}

/// `[logging]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Also write daily-rolling log files here
    pub file_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "conkit=info,conkit_core=info,conkit_workflow=info".to_string(),
            json: false,
            file_dir: None,
        }
    }
}

/// Load configuration from files and environment
pub fn load_config() -> Result<AppConfig> {
    let env = std::env::var("CONKIT_ENV").unwrap_or_else(|_| "development".to_string());
    let config = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{}", env)).required(false))
        .add_source(File::with_name("config/local").required(false))
        // CONKIT_SESSIONS__MAX_SESSIONS, single `_` after the prefix
        .add_source(
            Environment::with_prefix("CONKIT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}
