//! Redis session storage backend
//!
//! Keys are `conkit:session:<id>` by default and every write refreshes a TTL
//! equal to the store retention window, so Redis purges stale records on its
//! own and [`SessionStore::cleanup_expired`] has nothing left to do.

use super::SessionStore;
use crate::cancel::{cancelable, CallContext};
use crate::error::{Error, PersistenceError, Result};
use crate::session::SessionState;
use async_trait::async_trait;
use chrono::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Default key prefix
pub const DEFAULT_PREFIX: &str = "conkit:session:";

/// Redis-backed session store
///
/// Consider enabling Redis AUTH and TLS in production.
pub struct RedisStore {
    client: redis::Client,
    prefix: String,
    ttl_seconds: u64,
    closed: AtomicBool,
}

impl RedisStore {
    /// Create a new Redis store with a 24 hour retention window
    ///
    /// # Errors
    ///
    /// Returns error if the Redis URL is invalid
    pub fn new(redis_url: &str) -> Result<Self> {
        Self::with_options(redis_url, DEFAULT_PREFIX, 24 * 3600)
    }

    /// Create with custom prefix and TTL
    pub fn with_options(redis_url: &str, prefix: &str, ttl_seconds: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| PersistenceError::Open(format!("Invalid Redis URL: {}", e)))?;

        Ok(Self {
            client,
            prefix: prefix.to_string(),
            ttl_seconds: ttl_seconds.max(1),
            closed: AtomicBool::new(false),
        })
    }

    fn build_key(&self, session_id: &str) -> String {
        format!("{}{}", self.prefix, session_id)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PersistenceError::Closed.into());
        }
        Ok(())
    }
}

async fn connect(client: &redis::Client) -> Result<redis::aio::MultiplexedConnection> {
    client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| PersistenceError::Open(format!("Redis connection failed: {}", e)).into())
}

async fn scan_keys(
    conn: &mut redis::aio::MultiplexedConnection,
    prefix: &str,
) -> Result<Vec<String>> {
    let keys: Vec<String> = redis::cmd("KEYS")
        .arg(format!("{}*", prefix))
        .query_async(conn)
        .await
        .map_err(|e| PersistenceError::Read(format!("Redis KEYS failed: {}", e)))?;
    Ok(keys)
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn save(&self, ctx: &CallContext, session: &SessionState) -> Result<()> {
        self.ensure_open()?;
        let json = serde_json::to_string(session)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        let key = self.build_key(&session.session_id);
        let session_id = session.session_id.clone();
        let ttl = self.ttl_seconds;
        let client = self.client.clone();

        cancelable(ctx, "save session", async move {
            let mut conn = connect(&client).await?;
            redis::cmd("SETEX")
                .arg(&key)
                .arg(ttl)
                .arg(&json)
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| PersistenceError::Write(format!("Redis SETEX failed: {}", e)))?;

            debug!(session_id = %session_id, ttl = ttl, "Session saved to Redis");
            Ok(())
        })
        .await
    }

    async fn load(&self, ctx: &CallContext, session_id: &str) -> Result<SessionState> {
        self.ensure_open()?;
        let key = self.build_key(session_id);
        let session_id = session_id.to_string();
        let client = self.client.clone();

        cancelable(ctx, "load session", async move {
            let mut conn = connect(&client).await?;
            let data: Option<String> = redis::cmd("GET")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .map_err(|e| PersistenceError::Read(format!("Redis GET failed: {}", e)))?;

            match data {
                Some(json) => {
                    let session: SessionState = serde_json::from_str(&json)
                        .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
                    debug!(session_id = %session_id, "Session loaded from Redis");
                    Ok(session)
                }
                None => Err(Error::NotFound(session_id)),
            }
        })
        .await
    }

    async fn delete(&self, ctx: &CallContext, session_id: &str) -> Result<bool> {
        self.ensure_open()?;
        let key = self.build_key(session_id);
        let session_id = session_id.to_string();
        let client = self.client.clone();

        cancelable(ctx, "delete session", async move {
            let mut conn = connect(&client).await?;
            let deleted: i64 = redis::cmd("DEL")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .map_err(|e| PersistenceError::Delete(format!("Redis DEL failed: {}", e)))?;

            debug!(session_id = %session_id, deleted = deleted > 0, "Session deleted from Redis");
            Ok(deleted > 0)
        })
        .await
    }

    async fn list(&self, ctx: &CallContext) -> Result<Vec<String>> {
        self.ensure_open()?;
        let prefix = self.prefix.clone();
        let client = self.client.clone();

        cancelable(ctx, "list sessions", async move {
            let mut conn = connect(&client).await?;
            let keys = scan_keys(&mut conn, &prefix).await?;
            let mut ids: Vec<String> = keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
                .collect();
            ids.sort();
            Ok(ids)
        })
        .await
    }

    async fn load_all(&self, ctx: &CallContext) -> Result<Vec<SessionState>> {
        self.ensure_open()?;
        let prefix = self.prefix.clone();
        let client = self.client.clone();

        cancelable(ctx, "load all sessions", async move {
            let mut conn = connect(&client).await?;
            let keys = scan_keys(&mut conn, &prefix).await?;
            if keys.is_empty() {
                return Ok(Vec::new());
            }

            let values: Vec<Option<String>> = redis::cmd("MGET")
                .arg(&keys)
                .query_async(&mut conn)
                .await
                .map_err(|e| PersistenceError::Read(format!("Redis MGET failed: {}", e)))?;

            let mut sessions = Vec::with_capacity(values.len());
            for (key, value) in keys.iter().zip(values) {
                // Expired between KEYS and MGET
                let Some(json) = value else { continue };
                match serde_json::from_str::<SessionState>(&json) {
                    Ok(session) => sessions.push(session),
                    Err(e) => warn!(key = %key, error = %e, "Skipping undecodable session record"),
                }
            }
            Ok(sessions)
        })
        .await
    }

    async fn cleanup_expired(&self, ctx: &CallContext, _retention: Duration) -> Result<usize> {
        ctx.check("cleanup sessions")?;
        self.ensure_open()?;
        debug!("Redis TTL handles session record expiration");
        Ok(0)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
