//! Retry coordinator with bounded backoff
//!
//! Wraps persistence opens and stage-level tool calls. Every wait between
//! attempts is raced against the caller's [`CallContext`], so a retry loop can
//! be cancelled mid-backoff.

use crate::cancel::CallContext;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Substrings that mark an error message as transient
pub const DEFAULT_TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "deadline exceeded",
    "connection refused",
    "temporary failure",
    "rate limit",
    "throttled",
    "service unavailable",
    "504",
    "503",
    "502",
];

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Always `initial_delay`
    Fixed,
    /// `initial_delay * attempt`
    Linear,
    /// `initial_delay * multiplier^(attempt - 1)`
    #[default]
    Exponential,
}

/// Retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound applied before jitter
    pub max_delay: Duration,
    /// Growth factor for exponential backoff
    pub backoff_multiplier: f64,
    /// Backoff shape
    pub strategy: BackoffStrategy,
    /// Add random jitter to delays
    pub jitter: bool,
    /// Largest jitter as a fraction of the computed delay
    pub jitter_fraction: f64,
    /// Lowercase substrings that mark an error as transient
    pub transient_patterns: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            strategy: BackoffStrategy::Exponential,
            jitter: true,
            jitter_fraction: 0.1,
            transient_patterns: DEFAULT_TRANSIENT_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// Create the default policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum attempts
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set initial delay
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set backoff strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Enable or disable jitter
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based), before jitter
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let initial_ms = self.initial_delay.as_millis() as f64;
        let raw_ms = match self.strategy {
            BackoffStrategy::Fixed => initial_ms,
            BackoffStrategy::Linear => initial_ms * f64::from(attempt),
            BackoffStrategy::Exponential => {
                initial_ms * self.backoff_multiplier.powi(attempt as i32 - 1)
            }
        };
        let capped_ms = raw_ms.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped_ms as u64)
    }

    /// Delay to wait after failed attempt number `attempt`, jitter included
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter || self.jitter_fraction <= 0.0 {
            return base;
        }
        let max_jitter_ms = (base.as_millis() as f64 * self.jitter_fraction) as u64;
        if max_jitter_ms == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=max_jitter_ms);
        base + Duration::from_millis(jitter)
    }

    /// Whether an error message matches one of the transient patterns
    #[must_use]
    pub fn is_transient(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.transient_patterns
            .iter()
            .any(|pattern| lower.contains(pattern.as_str()))
    }
}

/// Error type for retry operations
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every allowed attempt failed, or the failure was not retryable
    Exhausted {
        /// The last error encountered
        last_error: E,
        /// Total number of attempts made
        attempts: u32,
    },
    /// The caller cancelled while waiting between attempts
    Cancelled {
        /// Attempts made before cancellation
        attempts: u32,
        /// Error from the last completed attempt
        last_error: E,
    },
}

impl<E> RetryError<E> {
    /// Last error seen before giving up
    pub fn into_last_error(self) -> E {
        match self {
            Self::Exhausted { last_error, .. } | Self::Cancelled { last_error, .. } => last_error,
        }
    }

    /// Number of attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Cancelled { attempts, .. } => *attempts,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted {
                last_error,
                attempts,
            } => write!(f, "Operation failed after {} attempts: {}", attempts, last_error),
            Self::Cancelled {
                last_error,
                attempts,
            } => write!(
                f,
                "Retry cancelled after {} attempts, last error: {}",
                attempts, last_error
            ),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for RetryError<E> {}

/// Execute an async operation with retry logic
///
/// The operation receives the 1-based attempt number. Waits between attempts
/// end early with [`RetryError::Cancelled`] when `ctx` fires.
///
/// # Example
/// ```ignore
/// let policy = RetryPolicy::default();
/// let result = retry_with_backoff(
///     &policy,
///     &ctx,
///     |_attempt| async { push_image().await },
///     |e| policy.is_transient(&e.to_string()),
/// ).await;
/// ```
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    ctx: &CallContext,
    mut operation: F,
    is_retryable: R,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Debug,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempt = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt >= max_attempts || !is_retryable(&e) {
                    debug!(attempt = attempt, error = ?e, "Operation failed, no more retries");
                    return Err(RetryError::Exhausted {
                        last_error: e,
                        attempts: attempt,
                    });
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = ?e,
                    "Operation failed, retrying"
                );
                if ctx.sleep(delay, "retry backoff").await.is_err() {
                    return Err(RetryError::Cancelled {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests;
