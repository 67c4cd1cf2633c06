//! Session record
//!
//! [`SessionState`] is the durable unit of work: one user's in-progress
//! containerization task. It is serialized whole into the store under its id.
//! Values handed out by the manager are snapshots; mutation happens only
//! inside `SessionManager::update`.

use crate::error::ToolError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

mod payload;

pub use payload::{
    DeploymentSummary, DockerfileState, DockerfileValidation, ManifestEntry, RepositoryAnalysis,
    SecurityScanSummary,
};

/// Default session TTL
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Default per-session disk allowance (1 GiB)
pub const DEFAULT_MAX_DISK_USAGE: u64 = 1024 * 1024 * 1024;

/// Execution history entries kept per session
pub const MAX_EXECUTION_HISTORY: usize = 100;

/// Log lines kept per log kind
pub const MAX_LOG_LINES: usize = 500;

/// Lifecycle status of a background job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Queued
    Pending,
    /// In flight
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Abandoned by the caller
    Cancelled,
}

impl JobStatus {
    /// Whether the job has finished one way or another
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// A job tracked on the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    /// Job id
    pub job_id: String,
    /// Tool or operation the job runs
    pub tool: String,
    /// Current status
    pub status: JobStatus,
    /// When the job started
    pub started_at: DateTime<Utc>,
    /// When the job reached a terminal status
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall time in milliseconds, set on completion
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Short result description
    #[serde(default)]
    pub result: Option<String>,
    /// Error message when failed
    #[serde(default)]
    pub error: Option<String>,
}

/// One tool execution in the session's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolExecution {
    /// Execution id
    pub execution_id: String,
    /// Tool name
    pub tool: String,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// End time, `None` while running
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Outcome, `None` while running
    #[serde(default)]
    pub success: Option<bool>,
    /// Tokens consumed by the call
    #[serde(default)]
    pub tokens_used: u64,
    /// Error message on failure
    #[serde(default)]
    pub error: Option<String>,
}

/// Derived status used by summaries and queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Live and within quota
    Active,
    /// Past its expiry time, awaiting garbage collection
    Expired,
    /// Workspace usage above the allowance
    QuotaExceeded,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::QuotaExceeded => "quota_exceeded",
        };
        f.write_str(s)
    }
}

/// Durable session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Immutable session id
    pub session_id: String,
    /// Scratch directory owned by this session
    pub workspace_dir: PathBuf,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last time the session was read or mutated through the manager
    pub last_accessed: DateTime<Utc>,
    /// Expiry time, `created_at + ttl`
    pub expires_at: DateTime<Utc>,

    /// Local repository path
    #[serde(default)]
    pub repo_path: Option<String>,
    /// Remote repository URL
    #[serde(default)]
    pub repo_url: Option<String>,
    /// Analysis result
    #[serde(default)]
    pub repo_analysis: Option<RepositoryAnalysis>,
    /// Dockerfile and build state
    #[serde(default)]
    pub dockerfile: DockerfileState,
    /// Built image reference
    #[serde(default)]
    pub image_ref: Option<String>,
    /// Registry the image was pushed to
    #[serde(default)]
    pub registry: Option<String>,
    /// Last security scan
    #[serde(default)]
    pub security_scan: Option<SecurityScanSummary>,
    /// Generated manifests keyed by name
    #[serde(default)]
    pub k8s_manifests: BTreeMap<String, ManifestEntry>,
    /// Last deployment
    #[serde(default)]
    pub deployment: Option<DeploymentSummary>,
    /// Image known to deploy cleanly, used for rollback
    #[serde(default)]
    pub last_known_good: Option<String>,

    /// Recent build output
    #[serde(default)]
    pub build_logs: Vec<String>,
    /// Recent deployment output
    #[serde(default)]
    pub deploy_logs: Vec<String>,

    /// Jobs keyed by id
    #[serde(default)]
    pub active_jobs: HashMap<String, JobInfo>,
    /// Bounded tool execution history, oldest first
    #[serde(default)]
    pub execution_history: Vec<ToolExecution>,
    /// Tokens consumed across all tool calls
    #[serde(default)]
    pub token_usage: u64,
    /// Last tool failure
    #[serde(default)]
    pub last_error: Option<ToolError>,

    /// Bytes used by the workspace at last measurement
    #[serde(default)]
    pub disk_usage: u64,
    /// Allowed workspace bytes
    #[serde(default = "default_max_disk_usage")]
    pub max_disk_usage: u64,

    /// Free-form labels
    #[serde(default)]
    pub labels: BTreeSet<String>,
    /// Kubernetes-style labels
    #[serde(default)]
    pub k8s_labels: BTreeMap<String, String>,
    /// Forward-compatible extension data (conversation snapshot lives here)
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

fn default_max_disk_usage() -> u64 {
    DEFAULT_MAX_DISK_USAGE
}

impl SessionState {
    /// Create a fresh session expiring `ttl` from now
    pub fn new(session_id: impl Into<String>, workspace_dir: PathBuf, ttl: Duration) -> Self {
        let now = Utc::now();
        // expires_at must stay strictly after created_at
        let ttl = if ttl <= Duration::zero() {
            Duration::seconds(1)
        } else {
            ttl
        };
        Self {
            session_id: session_id.into(),
            workspace_dir,
            created_at: now,
            last_accessed: now,
            expires_at: now + ttl,
            repo_path: None,
            repo_url: None,
            repo_analysis: None,
            dockerfile: DockerfileState::default(),
            image_ref: None,
            registry: None,
            security_scan: None,
            k8s_manifests: BTreeMap::new(),
            deployment: None,
            last_known_good: None,
            build_logs: Vec::new(),
            deploy_logs: Vec::new(),
            active_jobs: HashMap::new(),
            execution_history: Vec::new(),
            token_usage: 0,
            last_error: None,
            disk_usage: 0,
            max_disk_usage: DEFAULT_MAX_DISK_USAGE,
            labels: BTreeSet::new(),
            k8s_labels: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Bump `last_accessed`; never moves it backwards
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.last_accessed {
            self.last_accessed = now;
        }
    }

    /// Whether `now` is past the expiry time
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether the session is expired right now
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether workspace usage is above the allowance
    #[must_use]
    pub fn is_over_quota(&self) -> bool {
        self.max_disk_usage > 0 && self.disk_usage > self.max_disk_usage
    }

    /// Derived status; quota beats expiry, expiry beats active
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> SessionStatus {
        if self.is_over_quota() {
            SessionStatus::QuotaExceeded
        } else if self.is_expired_at(now) {
            SessionStatus::Expired
        } else {
            SessionStatus::Active
        }
    }

    /// Whether any job is still pending or running
    #[must_use]
    pub fn has_active_jobs(&self) -> bool {
        self.active_jobs.values().any(|j| !j.status.is_terminal())
    }

    /// Add a label; returns false if it was already present
    pub fn add_label(&mut self, label: impl Into<String>) -> bool {
        self.labels.insert(label.into())
    }

    /// Remove a label; returns false if it was absent
    pub fn remove_label(&mut self, label: &str) -> bool {
        self.labels.remove(label)
    }

    /// Whether the session carries `label`
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Register a new job in `Running` state
    pub fn start_job(&mut self, job_id: impl Into<String>, tool: impl Into<String>) -> &JobInfo {
        let job_id = job_id.into();
        let job = JobInfo {
            job_id: job_id.clone(),
            tool: tool.into(),
            status: JobStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            result: None,
            error: None,
        };
        self.active_jobs.entry(job_id).or_insert(job)
    }

    /// Move a job to `status`; terminal statuses stamp completion time and duration.
    /// Returns false if the job is unknown.
    pub fn set_job_status(
        &mut self,
        job_id: &str,
        status: JobStatus,
        result: Option<String>,
        error: Option<String>,
    ) -> bool {
        let Some(job) = self.active_jobs.get_mut(job_id) else {
            return false;
        };
        job.status = status;
        if result.is_some() {
            job.result = result;
        }
        if error.is_some() {
            job.error = error;
        }
        if status.is_terminal() {
            let now = Utc::now();
            job.completed_at = Some(now);
            job.duration_ms = Some((now - job.started_at).num_milliseconds().max(0) as u64);
        }
        true
    }

    /// Append a running tool execution to the bounded history
    pub fn begin_tool_execution(&mut self, execution_id: impl Into<String>, tool: impl Into<String>) {
        self.execution_history.push(ToolExecution {
            execution_id: execution_id.into(),
            tool: tool.into(),
            started_at: Utc::now(),
            ended_at: None,
            success: None,
            tokens_used: 0,
            error: None,
        });
        if self.execution_history.len() > MAX_EXECUTION_HISTORY {
            let excess = self.execution_history.len() - MAX_EXECUTION_HISTORY;
            self.execution_history.drain(..excess);
        }
    }

    /// Close a tool execution and add its tokens to the session total.
    /// Returns false if the execution is no longer in the history.
    pub fn finish_tool_execution(
        &mut self,
        execution_id: &str,
        success: bool,
        tokens_used: u64,
        error: Option<String>,
    ) -> bool {
        let Some(exec) = self
            .execution_history
            .iter_mut()
            .rev()
            .find(|e| e.execution_id == execution_id)
        else {
            return false;
        };
        exec.ended_at = Some(Utc::now());
        exec.success = Some(success);
        exec.tokens_used = tokens_used;
        exec.error = error;
        self.token_usage = self.token_usage.saturating_add(tokens_used);
        true
    }

    /// Append log lines, keeping only the newest [`MAX_LOG_LINES`]
    pub fn append_logs(logs: &mut Vec<String>, lines: impl IntoIterator<Item = String>) {
        logs.extend(lines);
        if logs.len() > MAX_LOG_LINES {
            let excess = logs.len() - MAX_LOG_LINES;
            logs.drain(..excess);
        }
    }

    /// Time since creation
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Summary view for listings
    #[must_use]
    pub fn summary_at(&self, now: DateTime<Utc>) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            status: self.status_at(now),
            created_at: self.created_at,
            last_accessed: self.last_accessed,
            expires_at: self.expires_at,
            repo_url: self.repo_url.clone(),
            image_ref: self.image_ref.clone(),
            labels: self.labels.iter().cloned().collect(),
            active_jobs: self
                .active_jobs
                .values()
                .filter(|j| !j.status.is_terminal())
                .count(),
            disk_usage: self.disk_usage,
            has_error: self.last_error.is_some(),
        }
    }

    /// Summary view as of now
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        self.summary_at(Utc::now())
    }
}

/// Summary view of a session (for list endpoints)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session id
    pub session_id: String,
    /// Derived status
    pub status: SessionStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last access
    pub last_accessed: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
    /// Repository URL
    pub repo_url: Option<String>,
    /// Built image
    pub image_ref: Option<String>,
    /// Labels, sorted
    pub labels: Vec<String>,
    /// Jobs still pending or running
    pub active_jobs: usize,
    /// Workspace bytes
    pub disk_usage: u64,
    /// Whether a tool error is recorded
    pub has_error: bool,
}

#[cfg(test)]
mod tests;
