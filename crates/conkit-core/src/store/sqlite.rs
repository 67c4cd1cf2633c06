//! SQLite session storage backend
//!
//! The default backend for conkit: one embedded database file, one row per
//! session, the whole [`SessionState`] serialized as JSON.
//!
//! # Locked databases
//!
//! If another process holds the database lock when the store opens, the file
//! (and its `-wal`/`-shm` sidecars) is moved aside to `<path>.locked-<unix-ts>`
//! and the open is retried exactly once on a fresh file. A second failure is
//! returned to the caller.
//!
//! # Usage
//!
//! ```no_run
//! use conkit_core::cancel::CallContext;
//! use conkit_core::store::SqliteStore;
//!
//! # async fn example() -> conkit_core::Result<()> {
//! let ctx = CallContext::background();
//! // Default location: ~/.conkit/sessions.db
//! let store = SqliteStore::open_default(&ctx).await?;
//!
//! // Or specify a custom path
//! let store = SqliteStore::open(&ctx, "/path/to/sessions.db").await?;
//! # Ok(())
//! # }
//! ```

use super::SessionStore;
use crate::cancel::{cancelable, CallContext};
use crate::error::{Error, PersistenceError, Result};
use crate::session::SessionState;
use crate::utils::{retry_with_backoff, RetryError, RetryPolicy};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Options for opening a [`SqliteStore`]
#[derive(Debug, Clone)]
pub struct SqliteStoreOptions {
    /// How long a statement waits on a busy database before failing
    pub busy_timeout: std::time::Duration,
    /// Pool size
    pub max_connections: u32,
    /// Retry policy for the open; the second attempt runs after quarantine
    pub lock_retry: RetryPolicy,
}

impl Default for SqliteStoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: std::time::Duration::from_secs(5),
            max_connections: 5,
            lock_retry: RetryPolicy::new()
                .with_max_attempts(2)
                .with_initial_delay(std::time::Duration::from_millis(100))
                .with_jitter(false),
        }
    }
}

impl SqliteStoreOptions {
    /// Set the busy timeout
    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Set the pool size
    #[must_use]
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }
}

/// SQLite session store
pub struct SqliteStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) a store at `path` with default options
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Locked` if the file is still locked after
    /// quarantine, or `PersistenceError::Open` for any other failure.
    pub async fn open(ctx: &CallContext, path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(ctx, path, SqliteStoreOptions::default()).await
    }

    /// Open a store at the default location (~/.conkit/sessions.db)
    pub async fn open_default(ctx: &CallContext) -> Result<Self> {
        let path = Self::default_path()?;
        Self::open(ctx, &path).await
    }

    /// Get the default database path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Configuration("Could not determine home directory".to_string()))?;
        Ok(home.join(".conkit").join("sessions.db"))
    }

    /// Open a store with explicit options
    pub async fn open_with(
        ctx: &CallContext,
        path: impl AsRef<Path>,
        options: SqliteStoreOptions,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                PersistenceError::Open(format!("Failed to create database directory: {}", e))
            })?;
        }

        let outcome = retry_with_backoff(
            &options.lock_retry,
            ctx,
            |attempt| {
                let path = path.clone();
                let options = options.clone();
                async move {
                    if attempt > 1 {
                        quarantine_locked_file(&path)?;
                    }
                    Self::connect(ctx, path, &options).await
                }
            },
            |e: &Error| matches!(e, Error::Persistence(PersistenceError::Locked { .. })),
        )
        .await;

        match outcome {
            Ok(store) => {
                info!(path = %store.path.display(), "SQLite session store initialized");
                Ok(store)
            }
            Err(RetryError::Exhausted { last_error, .. }) => Err(last_error),
            Err(RetryError::Cancelled { .. }) => Err(ctx
                .check("open store")
                .err()
                .unwrap_or_else(|| Error::Cancelled("open store".to_string()))),
        }
    }

    async fn connect(ctx: &CallContext, path: PathBuf, options: &SqliteStoreOptions) -> Result<Self> {
        let connect_options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(options.busy_timeout);
        let pool_options = SqlitePoolOptions::new().max_connections(options.max_connections);

        let error_path = path.clone();
        let pool = cancelable(ctx, "open store", async move {
            let pool = pool_options
                .connect_with(connect_options)
                .await
                .map_err(|e| classify(&error_path, e, PersistenceError::Open))?;
            if let Err(e) = init_schema(&pool).await {
                pool.close().await;
                return Err(classify(&error_path, e, PersistenceError::Open));
            }
            Ok(pool)
        })
        .await?;

        Ok(Self { pool, path })
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored records
    pub async fn count(&self, ctx: &CallContext) -> Result<usize> {
        self.ensure_open()?;
        let pool = self.pool.clone();
        let path = self.path.clone();
        cancelable(ctx, "count sessions", async move {
            let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
                .fetch_one(&pool)
                .await
                .map_err(|e| classify(&path, e, PersistenceError::Read))?;
            Ok(usize::try_from(row.0).unwrap_or_default())
        })
        .await
    }

    /// Check database health
    pub async fn health_check(&self, ctx: &CallContext) -> Result<bool> {
        self.ensure_open()?;
        let pool = self.pool.clone();
        let path = self.path.clone();
        cancelable(ctx, "health check", async move {
            sqlx::query("SELECT 1")
                .fetch_one(&pool)
                .await
                .map_err(|e| classify(&path, e, PersistenceError::Read))?;
            Ok(true)
        })
        .await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Err(PersistenceError::Closed.into());
        }
        Ok(())
    }
}

async fn init_schema(pool: &SqlitePool) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            session_data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions(updated_at)")
        .execute(pool)
        .await?;

    debug!("SQLite session schema initialized");
    Ok(())
}

/// Whether a driver error means another connection holds the lock
pub fn is_lock_error(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db) = err {
        // SQLITE_BUSY, SQLITE_LOCKED and their extended codes
        if matches!(
            db.code().as_deref(),
            Some("5" | "6" | "261" | "262" | "517")
        ) {
            return true;
        }
    }
    let message = err.to_string().to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("database is busy")
}

fn classify(path: &Path, err: sqlx::Error, kind: fn(String) -> PersistenceError) -> Error {
    if is_lock_error(&err) {
        PersistenceError::Locked {
            path: path.to_path_buf(),
        }
        .into()
    } else if matches!(err, sqlx::Error::PoolClosed) {
        PersistenceError::Closed.into()
    } else {
        kind(err.to_string()).into()
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Move a locked database file aside so a fresh one can be created
///
/// Returns the quarantine path. Sidecar files are moved along when present;
/// failing to move a sidecar is logged but not fatal.
pub fn quarantine_locked_file(path: &Path) -> Result<PathBuf> {
    let target = with_suffix(path, &format!(".locked-{}", Utc::now().timestamp()));

    if path.exists() {
        std::fs::rename(path, &target).map_err(|e| {
            PersistenceError::Open(format!(
                "Failed to quarantine locked database {}: {}",
                path.display(),
                e
            ))
        })?;
    }

    for sidecar in ["-wal", "-shm"] {
        let from = with_suffix(path, sidecar);
        if from.exists() {
            let to = with_suffix(&target, sidecar);
            if let Err(e) = std::fs::rename(&from, &to) {
                warn!(path = %from.display(), error = %e, "Failed to quarantine database sidecar");
            }
        }
    }

    warn!(
        path = %path.display(),
        quarantined = %target.display(),
        "Session database was locked, moved aside"
    );
    Ok(target)
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn save(&self, ctx: &CallContext, session: &SessionState) -> Result<()> {
        self.ensure_open()?;
        let data = serde_json::to_string(session)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        let session_id = session.session_id.clone();
        let created_at = session.created_at.to_rfc3339();
        let pool = self.pool.clone();
        let path = self.path.clone();

        cancelable(ctx, "save session", async move {
            let now = Utc::now().to_rfc3339();
            sqlx::query(
                r#"
                INSERT INTO sessions (session_id, session_data, created_at, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(session_id) DO UPDATE SET
                    session_data = excluded.session_data,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&session_id)
            .bind(&data)
            .bind(&created_at)
            .bind(&now)
            .execute(&pool)
            .await
            .map_err(|e| classify(&path, e, PersistenceError::Write))?;

            debug!(session_id = %session_id, "Session saved to SQLite");
            Ok(())
        })
        .await
    }

    async fn load(&self, ctx: &CallContext, session_id: &str) -> Result<SessionState> {
        self.ensure_open()?;
        let session_id = session_id.to_string();
        let pool = self.pool.clone();
        let path = self.path.clone();

        cancelable(ctx, "load session", async move {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT session_data FROM sessions WHERE session_id = ?")
                    .bind(&session_id)
                    .fetch_optional(&pool)
                    .await
                    .map_err(|e| classify(&path, e, PersistenceError::Read))?;

            match row {
                Some((data,)) => {
                    let session: SessionState = serde_json::from_str(&data)
                        .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
                    debug!(session_id = %session_id, "Session loaded from SQLite");
                    Ok(session)
                }
                None => Err(Error::NotFound(session_id)),
            }
        })
        .await
    }

    async fn delete(&self, ctx: &CallContext, session_id: &str) -> Result<bool> {
        self.ensure_open()?;
        let session_id = session_id.to_string();
        let pool = self.pool.clone();
        let path = self.path.clone();

        cancelable(ctx, "delete session", async move {
            let result = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
                .bind(&session_id)
                .execute(&pool)
                .await
                .map_err(|e| classify(&path, e, PersistenceError::Delete))?;

            let deleted = result.rows_affected() > 0;
            debug!(session_id = %session_id, deleted = deleted, "Session deleted from SQLite");
            Ok(deleted)
        })
        .await
    }

    async fn list(&self, ctx: &CallContext) -> Result<Vec<String>> {
        self.ensure_open()?;
        let pool = self.pool.clone();
        let path = self.path.clone();

        cancelable(ctx, "list sessions", async move {
            let rows: Vec<(String,)> =
                sqlx::query_as("SELECT session_id FROM sessions ORDER BY session_id")
                    .fetch_all(&pool)
                    .await
                    .map_err(|e| classify(&path, e, PersistenceError::Read))?;
            Ok(rows.into_iter().map(|(id,)| id).collect())
        })
        .await
    }

    async fn load_all(&self, ctx: &CallContext) -> Result<Vec<SessionState>> {
        self.ensure_open()?;
        let pool = self.pool.clone();
        let path = self.path.clone();

        cancelable(ctx, "load all sessions", async move {
            let mut rows = sqlx::query_as::<_, (String, String)>(
                "SELECT session_id, session_data FROM sessions",
            )
            .fetch(&pool);

            let mut sessions = Vec::new();
            while let Some((session_id, data)) = rows
                .try_next()
                .await
                .map_err(|e| classify(&path, e, PersistenceError::Read))?
            {
                match serde_json::from_str::<SessionState>(&data) {
                    Ok(session) => sessions.push(session),
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "Skipping undecodable session record");
                    }
                }
            }
            Ok(sessions)
        })
        .await
    }

    async fn cleanup_expired(&self, ctx: &CallContext, retention: Duration) -> Result<usize> {
        self.ensure_open()?;
        let cutoff = (Utc::now() - retention).to_rfc3339();
        let pool = self.pool.clone();
        let path = self.path.clone();

        cancelable(ctx, "cleanup sessions", async move {
            let result = sqlx::query("DELETE FROM sessions WHERE updated_at < ?")
                .bind(&cutoff)
                .execute(&pool)
                .await
                .map_err(|e| classify(&path, e, PersistenceError::Delete))?;

            let removed = usize::try_from(result.rows_affected()).unwrap_or_default();
            if removed > 0 {
                info!(removed = removed, "Purged stale session records");
            }
            Ok(removed)
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        debug!(path = %self.path.display(), "SQLite session store closed");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::{ConnectOptions, Connection};
    use tempfile::TempDir;

    async fn create_test_store() -> (SqliteStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test_sessions.db");
        let store = SqliteStore::open(&CallContext::background(), &db_path)
            .await
            .unwrap();
        (store, temp_dir)
    }

    fn session(id: &str) -> SessionState {
        SessionState::new(id, PathBuf::from("/tmp/ws").join(id), Duration::hours(1))
    }

    #[tokio::test]
    async fn test_sqlite_store_basic_operations() {
        let (store, _temp) = create_test_store().await;
        let ctx = CallContext::background();

        assert_eq!(store.count(&ctx).await.unwrap(), 0);

        let mut s = session("test-key");
        s.add_label("env:prod");
        s.k8s_labels.insert("app".into(), "web".into());
        store.save(&ctx, &s).await.unwrap();
        assert_eq!(store.count(&ctx).await.unwrap(), 1);

        let loaded = store.load(&ctx, "test-key").await.unwrap();
        assert_eq!(loaded, s);

        // Upsert keeps one row
        let mut updated = loaded;
        updated.repo_url = Some("https://example.com/app.git".into());
        store.save(&ctx, &updated).await.unwrap();
        assert_eq!(store.count(&ctx).await.unwrap(), 1);
        let reloaded = store.load(&ctx, "test-key").await.unwrap();
        assert_eq!(reloaded.repo_url.as_deref(), Some("https://example.com/app.git"));

        assert!(store.delete(&ctx, "test-key").await.unwrap());
        assert!(!store.delete(&ctx, "test-key").await.unwrap());
        assert!(matches!(
            store.load(&ctx, "test-key").await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_sqlite_store_list_and_load_all() {
        let (store, _temp) = create_test_store().await;
        let ctx = CallContext::background();

        for id in ["key1", "key2", "key3"] {
            store.save(&ctx, &session(id)).await.unwrap();
        }

        let ids = store.list(&ctx).await.unwrap();
        assert_eq!(ids, vec!["key1", "key2", "key3"]);

        // A corrupt row is skipped, not fatal
        sqlx::query("INSERT INTO sessions VALUES ('broken', '{not json', 'x', 'x')")
            .execute(&store.pool)
            .await
            .unwrap();
        let all = store.load_all(&ctx).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_sqlite_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("sessions.db");
        let ctx = CallContext::background();

        let store = SqliteStore::open(&ctx, &db_path).await.unwrap();
        store.save(&ctx, &session("durable")).await.unwrap();
        store.close().await.unwrap();

        let reopened = SqliteStore::open(&ctx, &db_path).await.unwrap();
        assert!(reopened.load(&ctx, "durable").await.is_ok());
        assert!(reopened.health_check(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_expired_uses_write_time() {
        let (store, _temp) = create_test_store().await;
        let ctx = CallContext::background();
        store.save(&ctx, &session("fresh")).await.unwrap();

        assert_eq!(store.cleanup_expired(&ctx, Duration::hours(1)).await.unwrap(), 0);
        assert_eq!(
            store.cleanup_expired(&ctx, Duration::seconds(-5)).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_closed_store_rejects_calls() {
        let (store, _temp) = create_test_store().await;
        let ctx = CallContext::background();
        store.close().await.unwrap();

        let err = store.save(&ctx, &session("late")).await.unwrap_err();
        assert!(matches!(err, Error::Persistence(PersistenceError::Closed)));
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_fast() {
        let (store, _temp) = create_test_store().await;
        let ctx = CallContext::background();
        ctx.cancel();

        let err = store.load(&ctx, "anything").await.unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }

    #[test]
    fn test_is_lock_error_by_message() {
        assert!(is_lock_error(&sqlx::Error::Protocol(
            "database is locked".to_string()
        )));
        assert!(!is_lock_error(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn test_quarantine_moves_file_and_sidecars() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("sessions.db");
        std::fs::write(&db_path, b"db").unwrap();
        std::fs::write(with_suffix(&db_path, "-wal"), b"wal").unwrap();

        let target = quarantine_locked_file(&db_path).unwrap();

        assert!(!db_path.exists());
        assert!(target.exists());
        assert!(target
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("sessions.db.locked-"));
        assert!(with_suffix(&target, "-wal").exists());
    }

    #[tokio::test]
    async fn test_locked_database_is_quarantined_and_reopened() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("sessions.db");

        // Another connection takes an exclusive lock and keeps it
        let mut holder = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .connect()
            .await
            .unwrap();
        sqlx::query("CREATE TABLE held (id INTEGER)")
            .execute(&mut holder)
            .await
            .unwrap();
        sqlx::query("BEGIN EXCLUSIVE")
            .execute(&mut holder)
            .await
            .unwrap();

        let options =
            SqliteStoreOptions::default().with_busy_timeout(std::time::Duration::from_millis(100));
        let ctx = CallContext::background();
        let store = SqliteStore::open_with(&ctx, &db_path, options).await.unwrap();

        store.save(&ctx, &session("after-lock")).await.unwrap();
        assert!(store.load(&ctx, "after-lock").await.is_ok());

        let quarantined = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("sessions.db.locked-")
            })
            .count();
        assert!(quarantined >= 1);

        holder.close().await.unwrap();
    }
}
