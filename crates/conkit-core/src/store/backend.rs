//! Store selection from configuration

use super::{MemoryStore, RedisStore, SessionStore, SqliteStore};
use crate::cancel::CallContext;
use crate::error::{Error, Result};
use crate::session::SessionState;
use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend type: "sqlite" (default), "redis", or "memory"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// SQLite database path; relative paths resolve against the data directory.
    /// An empty path selects the in-memory store.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Redis URL (only used when backend = "redis")
    #[serde(default)]
    pub redis_url: Option<String>,

    /// How long a record survives without being written
    #[serde(default = "default_retention")]
    pub retention_seconds: u64,

    /// SQLite busy timeout in milliseconds
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_backend() -> String {
    "sqlite".to_string()
}

fn default_sqlite_path() -> String {
    "sessions.db".to_string()
}

fn default_retention() -> u64 {
    7 * 24 * 3600 // 7 days
}

fn default_busy_timeout() -> u64 {
    5000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            sqlite_path: default_sqlite_path(),
            redis_url: None,
            retention_seconds: default_retention(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

impl StoreConfig {
    /// Retention window as a chrono duration
    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::seconds(i64::try_from(self.retention_seconds).unwrap_or(i64::MAX / 1000))
    }

    /// Resolve the SQLite path against `data_dir`
    #[must_use]
    pub fn resolve_sqlite_path(&self, data_dir: &Path) -> PathBuf {
        let path = PathBuf::from(&self.sqlite_path);
        if path.is_absolute() {
            path
        } else {
            data_dir.join(path)
        }
    }
}

/// Unified store that wraps the different backends
pub enum StoreBackend {
    /// SQLite storage (default)
    Sqlite(SqliteStore),
    /// Redis storage (shared deployments)
    Redis(RedisStore),
    /// In-memory storage
    Memory(MemoryStore),
}

impl StoreBackend {
    /// Create a store from configuration
    pub async fn from_config(
        ctx: &CallContext,
        config: &StoreConfig,
        data_dir: &Path,
    ) -> Result<Self> {
        match config.backend.as_str() {
            "sqlite" if config.sqlite_path.trim().is_empty() => Ok(Self::Memory(MemoryStore::new())),
            "sqlite" => {
                let path = config.resolve_sqlite_path(data_dir);
                let options = super::SqliteStoreOptions::default().with_busy_timeout(
                    std::time::Duration::from_millis(config.busy_timeout_ms),
                );
                let store = SqliteStore::open_with(ctx, &path, options).await?;
                Ok(Self::Sqlite(store))
            }
            "redis" => {
                let url = config
                    .redis_url
                    .as_deref()
                    .unwrap_or("redis://localhost:6379");
                let store = RedisStore::with_options(
                    url,
                    super::redis_store::DEFAULT_PREFIX,
                    config.retention_seconds,
                )?;
                Ok(Self::Redis(store))
            }
            "memory" => Ok(Self::Memory(MemoryStore::new())),
            other => Err(Error::Configuration(format!(
                "Unknown store backend: '{}'. Use 'sqlite', 'redis', or 'memory'.",
                other
            ))),
        }
    }

    fn inner(&self) -> &dyn SessionStore {
        match self {
            Self::Sqlite(store) => store,
            Self::Redis(store) => store,
            Self::Memory(store) => store,
        }
    }
}

#[async_trait]
impl SessionStore for StoreBackend {
    async fn save(&self, ctx: &CallContext, session: &SessionState) -> Result<()> {
        self.inner().save(ctx, session).await
    }

    async fn load(&self, ctx: &CallContext, session_id: &str) -> Result<SessionState> {
        self.inner().load(ctx, session_id).await
    }

    async fn delete(&self, ctx: &CallContext, session_id: &str) -> Result<bool> {
        self.inner().delete(ctx, session_id).await
    }

    async fn list(&self, ctx: &CallContext) -> Result<Vec<String>> {
        self.inner().list(ctx).await
    }

    async fn load_all(&self, ctx: &CallContext) -> Result<Vec<SessionState>> {
        self.inner().load_all(ctx).await
    }

    async fn cleanup_expired(&self, ctx: &CallContext, retention: Duration) -> Result<usize> {
        self.inner().cleanup_expired(ctx, retention).await
    }

    async fn close(&self) -> Result<()> {
        self.inner().close().await
    }

    fn backend_name(&self) -> &'static str {
        self.inner().backend_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_config_defaults() {
        let config: StoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.backend, "sqlite");
        assert_eq!(config.sqlite_path, "sessions.db");
        assert_eq!(config.retention(), Duration::days(7));
    }

    #[test]
    fn test_resolve_sqlite_path() {
        let config = StoreConfig::default();
        let resolved = config.resolve_sqlite_path(Path::new("/data"));
        assert_eq!(resolved, PathBuf::from("/data/sessions.db"));

        let absolute = StoreConfig {
            sqlite_path: "/var/lib/conkit/s.db".into(),
            ..StoreConfig::default()
        };
        assert_eq!(
            absolute.resolve_sqlite_path(Path::new("/data")),
            PathBuf::from("/var/lib/conkit/s.db")
        );
    }

    #[tokio::test]
    async fn test_backend_from_config() {
        let temp = TempDir::new().unwrap();
        let ctx = CallContext::background();

        let sqlite = StoreBackend::from_config(&ctx, &StoreConfig::default(), temp.path())
            .await
            .unwrap();
        assert_eq!(sqlite.backend_name(), "sqlite");
        assert!(temp.path().join("sessions.db").exists());

        let empty_path = StoreConfig {
            sqlite_path: String::new(),
            ..StoreConfig::default()
        };
        let memory = StoreBackend::from_config(&ctx, &empty_path, temp.path())
            .await
            .unwrap();
        assert_eq!(memory.backend_name(), "memory");

        let unknown = StoreConfig {
            backend: "etcd".into(),
            ..StoreConfig::default()
        };
        let err = StoreBackend::from_config(&ctx, &unknown, temp.path())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
