//! Conkit Core - Session Lifecycle Engine
//!
//! This crate provides the session layer of the conkit containerization
//! assistant, including:
//! - Store: Persisted session records (SQLite, Redis, in-memory)
//! - Session: The durable session model and its stage payloads
//! - Manager: Capacity- and TTL-bounded session lifecycle with one mutation path
//! - Query: Label, time-range and state filters with sort and pagination
//! - Cancel: Cancelable calls over engines that cannot be interrupted
//! - Utils: Retry with backoff, disk accounting

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cancel;
pub mod error;
pub mod manager;
pub mod query;
pub mod session;
pub mod store;
pub mod utils;
pub mod validation;

pub use cancel::{cancelable, CallContext};
pub use error::{
    format_error_for_chat, format_error_for_cli, Error, PersistenceError, Result, ToolError,
    UserFriendlyError,
};
pub use manager::{generate_session_id, GcReport, SessionManager, SessionManagerConfig, SessionStats};
pub use query::{query_sessions, QueryResult, SessionQuery, SortBy, SortOrder};
pub use session::{
    DeploymentSummary, DockerfileState, DockerfileValidation, JobInfo, JobStatus, ManifestEntry,
    RepositoryAnalysis, SecurityScanSummary, SessionState, SessionStatus, SessionSummary,
    ToolExecution,
};
pub use store::{MemoryStore, RedisStore, SessionStore, SqliteStore, StoreBackend, StoreConfig};
pub use utils::{retry_with_backoff, BackoffStrategy, RetryError, RetryPolicy};
