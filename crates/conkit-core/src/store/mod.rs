//! Persistent session store
//!
//! Maps a session id to one serialized [`SessionState`] record:
//! - SQLite store (default, durable, embedded)
//! - Redis store (optional, for shared deployments)
//! - In-memory store (tests and ephemeral deployments)
//!
//! Every data operation takes a [`CallContext`] and returns as soon as the
//! context is cancelled, even when the engine call underneath cannot be
//! interrupted. See [`crate::cancel`] for what that means for abandoned writes.

mod backend;
mod memory;
mod redis_store;
mod sqlite;

pub use backend::{StoreBackend, StoreConfig};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use sqlite::{is_lock_error, quarantine_locked_file, SqliteStore, SqliteStoreOptions};

use crate::cancel::CallContext;
use crate::error::Result;
use crate::session::SessionState;
use async_trait::async_trait;
use chrono::Duration;

/// Session store trait for abstracting storage backends
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace the record for `session.session_id`
    async fn save(&self, ctx: &CallContext, session: &SessionState) -> Result<()>;

    /// Load a record; a missing id is `Error::NotFound`
    async fn load(&self, ctx: &CallContext, session_id: &str) -> Result<SessionState>;

    /// Delete a record; returns whether one existed
    async fn delete(&self, ctx: &CallContext, session_id: &str) -> Result<bool>;

    /// List all stored session ids
    async fn list(&self, ctx: &CallContext) -> Result<Vec<String>>;

    /// Load every decodable record; undecodable ones are skipped with a warning
    async fn load_all(&self, ctx: &CallContext) -> Result<Vec<SessionState>>;

    /// Purge records not written within `retention`; returns how many were removed
    async fn cleanup_expired(&self, ctx: &CallContext, retention: Duration) -> Result<usize>;

    /// Release the underlying engine; later calls fail with `PersistenceError::Closed`
    async fn close(&self) -> Result<()>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}
