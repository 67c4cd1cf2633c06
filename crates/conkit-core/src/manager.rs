//! Session lifecycle manager
//!
//! Owns the resident session map and keeps it reconciled with a
//! [`SessionStore`]. One reader/writer lock guards the map: lookups, listings
//! and queries take the read side; creation, [`SessionManager::update`],
//! deletion, eviction and garbage collection take the write side. Saves that
//! follow an in-memory mutation run inside the same critical section, so no
//! reader can observe memory that disagrees with what is being written.
//!
//! [`SessionManager::update`] is the only mutation path. Every helper on this
//! type (labels, jobs, tool tracking, disk accounting) is built on it.

use crate::cancel::CallContext;
use crate::error::{Error, Result, ToolError};
use crate::query::{query_sessions, QueryResult, SessionQuery};
use crate::session::{JobStatus, SessionState, SessionStatus, SessionSummary, DEFAULT_MAX_DISK_USAGE};
use crate::store::SessionStore;
use crate::utils::{dir_size, format_bytes};
use crate::validation::{validate_k8s_label, validate_label, validate_session_id};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Session manager configuration
#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    /// Root under which each session gets `<root>/<session_id>`
    pub workspace_dir: PathBuf,
    /// Resident session cap; the least recently accessed session is evicted at the cap
    pub max_sessions: usize,
    /// Lifetime of a new session
    pub session_ttl: Duration,
    /// Per-session workspace allowance in bytes
    pub max_disk_per_session: u64,
    /// Combined workspace allowance in bytes; zero disables the check
    pub total_disk_limit: u64,
    /// How long the store keeps records that are no longer written
    pub store_retention: Duration,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            workspace_dir: std::env::temp_dir().join("conkit-workspaces"),
            max_sessions: 100,
            session_ttl: Duration::hours(crate::session::DEFAULT_TTL_HOURS),
            max_disk_per_session: DEFAULT_MAX_DISK_USAGE,
            total_disk_limit: 10 * DEFAULT_MAX_DISK_USAGE,
            store_retention: Duration::days(7),
        }
    }
}

impl SessionManagerConfig {
    /// Config rooted at `workspace_dir` with default limits
    #[must_use]
    pub fn new(workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
            ..Self::default()
        }
    }

    /// Set the resident session cap
    #[must_use]
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the session TTL
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Set per-session and total disk limits in bytes
    #[must_use]
    pub fn with_disk_limits(mut self, per_session: u64, total: u64) -> Self {
        self.max_disk_per_session = per_session;
        self.total_disk_limit = total;
        self
    }

    /// Set the store retention window
    #[must_use]
    pub fn with_store_retention(mut self, retention: Duration) -> Self {
        self.store_retention = retention;
        self
    }
}

/// Outcome of one garbage collection sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcReport {
    /// Expired sessions removed from memory
    pub expired_removed: usize,
    /// Workspace directories with no resident session
    pub orphan_workspaces_removed: usize,
    /// Records purged by the store's retention window
    pub store_purged: usize,
    /// Per-item failures that were logged and skipped
    pub failures: usize,
}

/// Session counts for observability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Resident sessions
    pub total_sessions: usize,
    /// Resident sessions that are neither expired nor over quota
    pub active_sessions: usize,
    /// Resident sessions past expiry, waiting for collection
    pub expired_sessions: usize,
    /// Sessions with a recorded tool error
    pub failed_sessions: usize,
    /// Sessions over their disk allowance
    pub quota_exceeded_sessions: usize,
    /// Mean session age in seconds
    pub average_age_seconds: f64,
    /// Combined workspace bytes at last measurement
    pub total_disk_usage: u64,
    /// Resident session cap
    pub max_sessions: usize,
    /// Store backend name
    pub store_backend: String,
}

/// Fresh session id: 32 hex characters from 16 random bytes
#[must_use]
pub fn generate_session_id() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Session lifecycle manager
pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionState>>,
    store: Arc<dyn SessionStore>,
    config: SessionManagerConfig,
}

impl SessionManager {
    /// Create a manager over `store`, creating the workspace root if needed
    pub fn new(config: SessionManagerConfig, store: Arc<dyn SessionStore>) -> Result<Self> {
        std::fs::create_dir_all(&config.workspace_dir).map_err(|e| {
            Error::Internal(format!(
                "Failed to create workspace root {}: {}",
                config.workspace_dir.display(),
                e
            ))
        })?;

        info!(
            workspace_dir = %config.workspace_dir.display(),
            max_sessions = config.max_sessions,
            ttl_seconds = config.session_ttl.num_seconds(),
            store = store.backend_name(),
            "Session manager initialized"
        );

        Ok(Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            config,
        })
    }

    /// Manager configuration
    pub fn config(&self) -> &SessionManagerConfig {
        &self.config
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Return the resident session, rehydrate it from the store, or create it.
    ///
    /// `None` allocates a fresh id. Creating at the cap evicts the least
    /// recently accessed session first. Concurrent callers with the same id
    /// always observe the same session.
    pub async fn get_or_create(
        &self,
        ctx: &CallContext,
        session_id: Option<&str>,
    ) -> Result<SessionState> {
        if let Some(id) = session_id {
            validate_session_id(id)?;
        }

        let mut sessions = self.sessions.write().await;

        if let Some(id) = session_id {
            if let Some(session) = sessions.get_mut(id) {
                session.touch();
                return Ok(session.clone());
            }

            match self.store.load(ctx, id).await {
                Ok(mut session) if !session.is_expired() => {
                    self.make_room(ctx, &mut sessions).await?;
                    create_workspace(&session.workspace_dir)?;
                    session.touch();
                    sessions.insert(id.to_string(), session.clone());
                    info!(session_id = %id, "Session rehydrated from store");
                    return Ok(session);
                }
                Ok(_) => {
                    debug!(session_id = %id, "Persisted session is expired, starting fresh");
                }
                Err(Error::NotFound(_)) => {}
                Err(e) => {
                    // A fresh session saved under this id would overwrite the record
                    warn!(session_id = %id, error = %e, "Failed to load persisted session");
                    return Err(e);
                }
            }
        }

        let id = session_id.map_or_else(generate_session_id, str::to_string);

        self.make_room(ctx, &mut sessions).await?;
        self.ensure_total_disk(&sessions)?;

        let workspace = self.config.workspace_dir.join(&id);
        create_workspace(&workspace)?;

        let mut session = SessionState::new(&id, workspace, self.config.session_ttl);
        session.max_disk_usage = self.config.max_disk_per_session;

        if let Err(e) = self.store.save(ctx, &session).await {
            if e.is_cancellation() {
                let _ = std::fs::remove_dir_all(&session.workspace_dir);
                return Err(e);
            }
            warn!(session_id = %id, error = %e, "Failed to persist new session");
        }

        sessions.insert(id.clone(), session.clone());
        info!(session_id = %id, resident = sessions.len(), "Session created");
        Ok(session)
    }

    /// Resident session by id; never consults the store
    pub async fn get(&self, session_id: &str) -> Result<SessionState> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(session_id.to_string()))
    }

    /// Apply `f` to a resident session under the write lock, then persist.
    ///
    /// `f` runs on a copy; an error from `f` leaves the session untouched.
    /// On success the copy replaces the resident session with `last_accessed`
    /// bumped and is saved before the lock is released. If the save fails the
    /// in-memory change stays committed and the save error is returned, so a
    /// caller can tell a lost write from a rejected mutation.
    pub async fn update<T, F>(&self, ctx: &CallContext, session_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut SessionState) -> Result<T>,
    {
        let mut sessions = self.sessions.write().await;
        let current = sessions
            .get(session_id)
            .ok_or_else(|| Error::NotFound(session_id.to_string()))?;

        let mut next = current.clone();
        let value = f(&mut next)?;

        next.session_id = current.session_id.clone();
        if next.last_accessed < current.last_accessed {
            next.last_accessed = current.last_accessed;
        }
        next.touch();

        sessions.insert(session_id.to_string(), next.clone());

        if let Err(e) = self.store.save(ctx, &next).await {
            warn!(session_id = %session_id, error = %e, "Session updated in memory but not persisted");
            return Err(e);
        }
        Ok(value)
    }

    /// Remove a session's persisted record, resident entry and workspace.
    ///
    /// Fails without touching memory if the store cannot delete the record.
    /// Workspace removal failures are logged only.
    pub async fn delete(&self, ctx: &CallContext, session_id: &str) -> Result<()> {
        validate_session_id(session_id)?;
        let mut sessions = self.sessions.write().await;

        let existed_in_store = self.store.delete(ctx, session_id).await?;
        let removed = sessions.remove(session_id);
        if removed.is_none() && !existed_in_store {
            return Err(Error::NotFound(session_id.to_string()));
        }

        let workspace = removed
            .as_ref()
            .map(|s| s.workspace_dir.clone())
            .unwrap_or_else(|| self.config.workspace_dir.join(session_id));
        if let Err(e) = remove_workspace(&workspace) {
            warn!(session_id = %session_id, error = %e, "Failed to remove session workspace");
        }

        info!(session_id = %session_id, "Session deleted");
        Ok(())
    }

    /// Reap expired sessions, orphan workspaces and stale store records.
    ///
    /// Per-item failures are logged and counted; only cancellation stops the
    /// sweep early. Running it twice in a row is harmless.
    pub async fn garbage_collect(&self, ctx: &CallContext) -> Result<GcReport> {
        let now = Utc::now();
        let mut report = GcReport::default();
        let mut sessions = self.sessions.write().await;

        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.is_expired_at(now))
            .map(|s| s.session_id.clone())
            .collect();

        for id in expired {
            let Some(session) = sessions.remove(&id) else {
                continue;
            };
            report.expired_removed += 1;

            if let Err(e) = remove_workspace(&session.workspace_dir) {
                warn!(session_id = %id, error = %e, "Failed to remove expired session workspace");
                report.failures += 1;
            }
            match self.store.delete(ctx, &id).await {
                Ok(_) => debug!(session_id = %id, "Expired session collected"),
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    warn!(session_id = %id, error = %e, "Failed to delete expired session record");
                    report.failures += 1;
                }
            }
        }

        let resident: HashSet<&str> = sessions.keys().map(String::as_str).collect();
        match std::fs::read_dir(&self.config.workspace_dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    let name = entry.file_name();
                    let is_resident = name.to_str().is_some_and(|n| resident.contains(n));
                    if !path.is_dir() || is_resident {
                        continue;
                    }
                    match std::fs::remove_dir_all(&path) {
                        Ok(()) => {
                            debug!(path = %path.display(), "Removed orphan workspace");
                            report.orphan_workspaces_removed += 1;
                        }
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Failed to remove orphan workspace");
                            report.failures += 1;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(
                    workspace_dir = %self.config.workspace_dir.display(),
                    error = %e,
                    "Failed to scan workspace root"
                );
                report.failures += 1;
            }
        }

        match self
            .store
            .cleanup_expired(ctx, self.config.store_retention)
            .await
        {
            Ok(purged) => report.store_purged = purged,
            Err(e) if e.is_cancellation() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Failed to purge stale session records");
                report.failures += 1;
            }
        }

        info!(
            expired = report.expired_removed,
            orphans = report.orphan_workspaces_removed,
            purged = report.store_purged,
            failures = report.failures,
            "Garbage collection finished"
        );
        Ok(report)
    }

    /// Rehydrate persisted, unexpired sessions up to the cap, most recently
    /// accessed first. Returns how many were loaded.
    pub async fn load_existing(&self, ctx: &CallContext) -> Result<usize> {
        let mut persisted = self.store.load_all(ctx).await?;
        let now = Utc::now();
        persisted.retain(|s| !s.is_expired_at(now));
        persisted.sort_by(|a, b| {
            b.last_accessed
                .cmp(&a.last_accessed)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });

        let mut sessions = self.sessions.write().await;
        let mut loaded = 0;
        for session in persisted {
            if sessions.len() >= self.config.max_sessions {
                break;
            }
            if sessions.contains_key(&session.session_id) {
                continue;
            }
            if let Err(e) = create_workspace(&session.workspace_dir) {
                warn!(session_id = %session.session_id, error = %e, "Skipping session without usable workspace");
                continue;
            }
            sessions.insert(session.session_id.clone(), session);
            loaded += 1;
        }

        info!(loaded = loaded, "Loaded persisted sessions");
        Ok(loaded)
    }

    /// Final sweep, then close the store
    pub async fn stop(&self, ctx: &CallContext) -> Result<()> {
        if let Err(e) = self.garbage_collect(ctx).await {
            warn!(error = %e, "Final garbage collection failed");
        }
        self.store.close().await?;
        info!("Session manager stopped");
        Ok(())
    }

    /// Session counts and disk totals
    pub async fn stats(&self) -> SessionStats {
        let now = Utc::now();
        let sessions = self.sessions.read().await;

        let mut stats = SessionStats {
            total_sessions: sessions.len(),
            max_sessions: self.config.max_sessions,
            store_backend: self.store.backend_name().to_string(),
            ..SessionStats::default()
        };
        let mut total_age = 0i64;
        for session in sessions.values() {
            match session.status_at(now) {
                SessionStatus::Active => stats.active_sessions += 1,
                SessionStatus::Expired => stats.expired_sessions += 1,
                SessionStatus::QuotaExceeded => stats.quota_exceeded_sessions += 1,
            }
            if session.last_error.is_some() {
                stats.failed_sessions += 1;
            }
            stats.total_disk_usage = stats.total_disk_usage.saturating_add(session.disk_usage);
            total_age += session.age_at(now).num_seconds().max(0);
        }
        if !sessions.is_empty() {
            stats.average_age_seconds = total_age as f64 / sessions.len() as f64;
        }
        stats
    }

    /// Summaries of resident sessions, most recently accessed first
    pub async fn list_summaries(&self) -> Vec<SessionSummary> {
        let now = Utc::now();
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> =
            sessions.values().map(|s| s.summary_at(now)).collect();
        summaries.sort_by(|a, b| {
            b.last_accessed
                .cmp(&a.last_accessed)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        summaries
    }

    /// Copies of every resident session
    pub async fn all_sessions(&self) -> Vec<SessionState> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Resident session count
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is resident
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Filter, sort and paginate resident sessions
    pub async fn query_sessions(&self, query: &SessionQuery) -> QueryResult {
        let sessions = self.sessions.read().await;
        query_sessions(sessions.values(), query, Utc::now())
    }

    /// Distinct labels across resident sessions, sorted
    pub async fn all_labels(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let labels: BTreeSet<&String> = sessions.values().flat_map(|s| s.labels.iter()).collect();
        labels.into_iter().cloned().collect()
    }

    /// Add a label; returns false if it was already present
    pub async fn add_label(&self, ctx: &CallContext, session_id: &str, label: &str) -> Result<bool> {
        validate_label(label)?;
        self.update(ctx, session_id, |s| Ok(s.add_label(label))).await
    }

    /// Remove a label; returns false if it was absent
    pub async fn remove_label(&self, ctx: &CallContext, session_id: &str, label: &str) -> Result<bool> {
        self.update(ctx, session_id, |s| Ok(s.remove_label(label))).await
    }

    /// Replace the label set
    pub async fn set_labels(
        &self,
        ctx: &CallContext,
        session_id: &str,
        labels: Vec<String>,
    ) -> Result<()> {
        for label in &labels {
            validate_label(label)?;
        }
        self.update(ctx, session_id, |s| {
            s.labels = labels.into_iter().collect();
            Ok(())
        })
        .await
    }

    /// Set a Kubernetes-style label
    pub async fn set_k8s_label(
        &self,
        ctx: &CallContext,
        session_id: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        validate_k8s_label(key, value)?;
        self.update(ctx, session_id, |s| {
            s.k8s_labels.insert(key.to_string(), value.to_string());
            Ok(())
        })
        .await
    }

    /// Register a running job for `tool`; returns the job id
    pub async fn start_job(&self, ctx: &CallContext, session_id: &str, tool: &str) -> Result<String> {
        let job_id = Uuid::new_v4().to_string();
        self.update(ctx, session_id, |s| {
            s.start_job(job_id.clone(), tool);
            Ok(())
        })
        .await?;
        debug!(session_id = %session_id, job_id = %job_id, tool = %tool, "Job started");
        Ok(job_id)
    }

    /// Move a job to `status`
    pub async fn update_job_status(
        &self,
        ctx: &CallContext,
        session_id: &str,
        job_id: &str,
        status: JobStatus,
    ) -> Result<()> {
        self.update(ctx, session_id, |s| {
            if s.set_job_status(job_id, status, None, None) {
                Ok(())
            } else {
                Err(Error::NotFound(format!("job {} in session {}", job_id, session_id)))
            }
        })
        .await
    }

    /// Finish a job as completed (`Ok`) or failed (`Err`)
    pub async fn complete_job(
        &self,
        ctx: &CallContext,
        session_id: &str,
        job_id: &str,
        outcome: std::result::Result<String, String>,
    ) -> Result<()> {
        let (status, result, error) = match outcome {
            Ok(result) => (JobStatus::Completed, Some(result), None),
            Err(error) => (JobStatus::Failed, None, Some(error)),
        };
        self.update(ctx, session_id, |s| {
            if s.set_job_status(job_id, status, result, error) {
                Ok(())
            } else {
                Err(Error::NotFound(format!("job {} in session {}", job_id, session_id)))
            }
        })
        .await
    }

    /// Open a tool execution record; returns its id
    pub async fn track_tool_execution(
        &self,
        ctx: &CallContext,
        session_id: &str,
        tool: &str,
    ) -> Result<String> {
        let execution_id = Uuid::new_v4().to_string();
        self.update(ctx, session_id, |s| {
            s.begin_tool_execution(execution_id.clone(), tool);
            Ok(())
        })
        .await?;
        Ok(execution_id)
    }

    /// Close a tool execution record and account its tokens
    pub async fn complete_tool_execution(
        &self,
        ctx: &CallContext,
        session_id: &str,
        execution_id: &str,
        success: bool,
        tokens_used: u64,
        error: Option<String>,
    ) -> Result<()> {
        self.update(ctx, session_id, |s| {
            if !s.finish_tool_execution(execution_id, success, tokens_used, error) {
                // Aged out of the bounded history; tokens still count
                s.token_usage = s.token_usage.saturating_add(tokens_used);
            }
            Ok(())
        })
        .await
    }

    /// Record the most recent tool failure
    pub async fn track_error(&self, ctx: &CallContext, session_id: &str, error: ToolError) -> Result<()> {
        self.update(ctx, session_id, |s| {
            s.last_error = Some(error);
            Ok(())
        })
        .await
    }

    /// Measure the workspace on disk and store the result
    pub async fn refresh_disk_usage(&self, ctx: &CallContext, session_id: &str) -> Result<u64> {
        let workspace = self.get(session_id).await?.workspace_dir;
        let size = tokio::task::spawn_blocking(move || dir_size(&workspace))
            .await
            .map_err(|e| Error::Internal(format!("disk usage task failed: {}", e)))?;

        self.update(ctx, session_id, |s| {
            s.disk_usage = size;
            Ok(())
        })
        .await?;
        debug!(session_id = %session_id, disk_usage = %format_bytes(size), "Disk usage refreshed");
        Ok(size)
    }

    /// Fail with `Capacity` if the session or all sessions together exceed their allowance
    pub async fn check_disk_quota(&self, session_id: &str) -> Result<()> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| Error::NotFound(session_id.to_string()))?;

        if session.is_over_quota() {
            return Err(Error::Capacity(format!(
                "session {} uses {} of {} allowed",
                session_id,
                format_bytes(session.disk_usage),
                format_bytes(session.max_disk_usage)
            )));
        }
        self.ensure_total_disk(&sessions)
    }

    fn ensure_total_disk(&self, sessions: &HashMap<String, SessionState>) -> Result<()> {
        if self.config.total_disk_limit == 0 {
            return Ok(());
        }
        let total: u64 = sessions.values().map(|s| s.disk_usage).sum();
        if total >= self.config.total_disk_limit {
            return Err(Error::Capacity(format!(
                "workspaces use {} of {} allowed in total",
                format_bytes(total),
                format_bytes(self.config.total_disk_limit)
            )));
        }
        Ok(())
    }

    /// Evict least recently accessed sessions until one more fits
    async fn make_room(
        &self,
        ctx: &CallContext,
        sessions: &mut HashMap<String, SessionState>,
    ) -> Result<()> {
        if self.config.max_sessions == 0 {
            return Err(Error::Capacity(
                "max_sessions is 0, no session can be created".to_string(),
            ));
        }

        while sessions.len() >= self.config.max_sessions {
            let Some(victim) = sessions
                .values()
                .min_by(|a, b| {
                    a.last_accessed
                        .cmp(&b.last_accessed)
                        .then_with(|| a.session_id.cmp(&b.session_id))
                })
                .map(|s| s.session_id.clone())
            else {
                return Err(Error::Capacity("no session available to evict".to_string()));
            };

            let Some(evicted) = sessions.remove(&victim) else {
                return Err(Error::Capacity("no session available to evict".to_string()));
            };
            if let Err(e) = remove_workspace(&evicted.workspace_dir) {
                warn!(session_id = %victim, error = %e, "Failed to remove evicted session workspace");
            }
            match self.store.delete(ctx, &victim).await {
                Ok(_) => {}
                Err(e) if e.is_cancellation() => {
                    return Err(e);
                }
                Err(e) => {
                    warn!(session_id = %victim, error = %e, "Failed to delete evicted session record");
                }
            }
            info!(session_id = %victim, "Evicted least recently accessed session");
        }
        Ok(())
    }
}

fn create_workspace(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| {
        Error::Internal(format!("Failed to create workspace {}: {}", path.display(), e))
    })?;

    // Owner and group only on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o750);
        let _ = std::fs::set_permissions(path, perms);
    }
    Ok(())
}

fn remove_workspace(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
