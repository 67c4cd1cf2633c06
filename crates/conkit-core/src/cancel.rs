//! Cancelable external calls
//!
//! Store engines expose calls that cannot be interrupted once started. Every
//! store operation therefore runs as a spawned task raced against the caller's
//! [`CallContext`]. When the context fires first the caller gets
//! [`Error::Cancelled`] or [`Error::DeadlineExceeded`] right away, and the
//! spawned call is abandoned, not aborted: it may still finish and its side
//! effects (a written row, a deleted key) may still become visible. Callers must
//! not assume an abandoned write did not happen.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cancellation scope for one caller-visible operation
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled and has no deadline
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Wrap an existing cancellation token
    #[must_use]
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a context that additionally expires after `timeout`
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Derive a child context; cancelling the child leaves the parent untouched
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and every child derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Underlying cancellation token
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Deadline, if any
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the context is already done
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled(operation.to_string()));
        }
        if matches!(self.deadline, Some(d) if Instant::now() >= d) {
            return Err(Error::DeadlineExceeded(operation.to_string()));
        }
        Ok(())
    }

    /// Resolves once the context is cancelled or its deadline passes,
    /// yielding the matching error
    pub async fn done(&self, operation: &str) -> Error {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => Error::Cancelled(operation.to_string()),
                    _ = tokio::time::sleep_until(deadline) => {
                        Error::DeadlineExceeded(operation.to_string())
                    }
                }
            }
            None => {
                self.token.cancelled().await;
                Error::Cancelled(operation.to_string())
            }
        }
    }

    /// Sleep for `delay` unless the context fires first
    pub async fn sleep(&self, delay: Duration, operation: &str) -> Result<()> {
        tokio::select! {
            err = self.done(operation) => Err(err),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// Run `call` as an abandonable task raced against `ctx`.
///
/// The future is spawned so the engine call keeps its own lifetime; when the
/// context wins the race the join handle is dropped and the task runs on to
/// completion unobserved.
pub async fn cancelable<T, F>(ctx: &CallContext, operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    ctx.check(operation)?;

    let handle = tokio::spawn(call);

    tokio::select! {
        biased;
        err = ctx.done(operation) => {
            debug!(operation = operation, error = %err, "Store call abandoned, engine work may still complete");
            Err(err)
        }
        joined = handle => match joined {
            Ok(result) => result,
            Err(e) => Err(Error::Internal(format!("{} task failed: {}", operation, e))),
        },
    }
}

#[cfg(test)]
mod tests;
