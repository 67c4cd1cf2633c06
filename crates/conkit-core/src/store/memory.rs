//! In-memory session store
//!
//! Records are cloned on the way in and on the way out, so a caller mutating a
//! loaded session never changes what the store holds.

use super::SessionStore;
use crate::cancel::CallContext;
use crate::error::{Error, PersistenceError, Result};
use crate::session::SessionState;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone)]
struct StoredRecord {
    state: SessionState,
    updated_at: DateTime<Utc>,
}

/// In-memory session store
///
/// Data is lost on restart. Use [`super::SqliteStore`] when sessions must
/// survive the process.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<String, StoredRecord>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PersistenceError::Closed.into());
        }
        Ok(())
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save(&self, ctx: &CallContext, session: &SessionState) -> Result<()> {
        ctx.check("save")?;
        self.ensure_open()?;
        let record = StoredRecord {
            state: session.clone(),
            updated_at: Utc::now(),
        };
        self.records
            .write()
            .await
            .insert(session.session_id.clone(), record);
        debug!(session_id = %session.session_id, "Session saved to memory store");
        Ok(())
    }

    async fn load(&self, ctx: &CallContext, session_id: &str) -> Result<SessionState> {
        ctx.check("load")?;
        self.ensure_open()?;
        self.records
            .read()
            .await
            .get(session_id)
            .map(|r| r.state.clone())
            .ok_or_else(|| Error::NotFound(session_id.to_string()))
    }

    async fn delete(&self, ctx: &CallContext, session_id: &str) -> Result<bool> {
        ctx.check("delete")?;
        self.ensure_open()?;
        Ok(self.records.write().await.remove(session_id).is_some())
    }

    async fn list(&self, ctx: &CallContext) -> Result<Vec<String>> {
        ctx.check("list")?;
        self.ensure_open()?;
        Ok(self.records.read().await.keys().cloned().collect())
    }

    async fn load_all(&self, ctx: &CallContext) -> Result<Vec<SessionState>> {
        ctx.check("load_all")?;
        self.ensure_open()?;
        Ok(self
            .records
            .read()
            .await
            .values()
            .map(|r| r.state.clone())
            .collect())
    }

    async fn cleanup_expired(&self, ctx: &CallContext, retention: Duration) -> Result<usize> {
        ctx.check("cleanup_expired")?;
        self.ensure_open()?;
        let cutoff = Utc::now() - retention;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.updated_at >= cutoff);
        let removed = before - records.len();
        if removed > 0 {
            debug!(removed = removed, "Purged stale records from memory store");
        }
        Ok(removed)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn session(id: &str) -> SessionState {
        SessionState::new(id, PathBuf::from("/tmp/ws").join(id), Duration::hours(1))
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let ctx = CallContext::background();
        let mut s = session("s1");
        s.add_label("env:prod");

        store.save(&ctx, &s).await.unwrap();
        let loaded = store.load(&ctx, "s1").await.unwrap();
        assert_eq!(loaded, s);
    }

    #[tokio::test]
    async fn test_loaded_copy_does_not_alias_store() {
        let store = MemoryStore::new();
        let ctx = CallContext::background();
        let mut original = session("s1");
        store.save(&ctx, &original).await.unwrap();

        // Mutating the caller's value after save does not leak in.
        original.add_label("after-save");
        let mut loaded = store.load(&ctx, "s1").await.unwrap();
        assert!(!loaded.has_label("after-save"));

        // Mutating a loaded value does not leak in either.
        loaded.add_label("after-load");
        let reloaded = store.load(&ctx, "s1").await.unwrap();
        assert!(!reloaded.has_label("after-load"));
    }

    #[tokio::test]
    async fn test_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .load(&CallContext::background(), "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let store = MemoryStore::new();
        let ctx = CallContext::background();
        store.save(&ctx, &session("a")).await.unwrap();
        store.save(&ctx, &session("b")).await.unwrap();

        let mut ids = store.list(&ctx).await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

        assert!(store.delete(&ctx, "a").await.unwrap());
        assert!(!store.delete(&ctx, "a").await.unwrap());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_cancelled_context_is_observed() {
        let store = MemoryStore::new();
        let ctx = CallContext::background();
        ctx.cancel();
        let err = store.save(&ctx, &session("s1")).await.unwrap_err();
        assert!(err.is_cancellation());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_cleanup_and_close() {
        let store = MemoryStore::new();
        let ctx = CallContext::background();
        store.save(&ctx, &session("old")).await.unwrap();

        assert_eq!(store.cleanup_expired(&ctx, Duration::hours(1)).await.unwrap(), 0);
        assert_eq!(store.cleanup_expired(&ctx, Duration::seconds(-1)).await.unwrap(), 1);

        store.close().await.unwrap();
        let err = store.list(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::Persistence(PersistenceError::Closed)));
    }
}
