//! Utility modules for conkit-core
//!
//! - retry: Retry coordinator with bounded, cancellable backoff
//! - disk: Workspace disk accounting helpers

mod disk;
mod retry;

pub use disk::{dir_size, format_bytes};
pub use retry::{
    retry_with_backoff, BackoffStrategy, RetryError, RetryPolicy, DEFAULT_TRANSIENT_PATTERNS,
};
