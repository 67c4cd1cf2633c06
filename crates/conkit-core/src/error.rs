//! Error types for conkit-core
//!
//! One error enum covers the whole session engine. Tool failures are carried
//! as plain values (`ToolError`) so the workflow can embed them in responses
//! instead of aborting a conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown session id
    #[error("session not found: {0}")]
    NotFound(String),

    /// Session limit or disk limit reached and nothing could be reclaimed
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// Store open/read/write/delete failure
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Malformed input (session id, labels, turn input)
    #[error("invalid {field}: {message}")]
    Validation {
        /// Offending field
        field: String,
        /// What was wrong with it
        message: String,
    },

    /// A dispatched tool call failed
    #[error("tool error: {0}")]
    Tool(ToolError),

    /// Stage reached with an unmet precondition
    #[error("workflow error: {0}")]
    Workflow(String),

    /// The caller cancelled the operation
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// The caller's deadline passed before the operation finished
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error (task join failures, filesystem errors, etc.)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from the caller giving up (cancel or deadline)
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_) | Self::DeadlineExceeded(_))
    }

    /// Whether this error is a store failure
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

/// Store failures
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Another process holds the database lock
    #[error("store at {} is locked by another process", path.display())]
    Locked {
        /// Database file
        path: PathBuf,
    },

    /// Store could not be opened for another reason
    #[error("failed to open store: {0}")]
    Open(String),

    /// Read failed
    #[error("read failed: {0}")]
    Read(String),

    /// Write failed
    #[error("write failed: {0}")]
    Write(String),

    /// Delete failed
    #[error("delete failed: {0}")]
    Delete(String),

    /// Record could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Store was closed
    #[error("store is closed")]
    Closed,
}

/// A failed tool call, as recorded in responses and session records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    /// Tool that failed
    pub tool: String,
    /// Classification tag, e.g. `build_error`, `deployment_error`
    pub error_type: String,
    /// Human readable message
    pub message: String,
    /// Whether the user may retry the operation
    pub retryable: bool,
    /// When the failure was observed
    pub timestamp: DateTime<Utc>,
}

impl ToolError {
    /// Create a tool error stamped with the current time
    pub fn new(
        tool: impl Into<String>,
        error_type: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            tool: tool.into(),
            error_type: error_type.into(),
            message: message.into(),
            retryable,
            timestamp: Utc::now(),
        }
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed ({}): {}", self.tool, self.error_type, self.message)
    }
}

impl std::error::Error for ToolError {}

impl From<ToolError> for Error {
    fn from(err: ToolError) -> Self {
        Self::Tool(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for user-friendly error messages
///
/// Provides human-readable error messages and suggestions for fixing them.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::NotFound(id) => format!("🔍 Session '{}' does not exist.", id),
            Error::Capacity(msg) => format!("📦 No room for another session: {}", msg),
            Error::Persistence(PersistenceError::Locked { path }) => format!(
                "🔒 The session database {} is in use by another process.",
                path.display()
            ),
            Error::Persistence(e) => format!("💾 Session storage problem: {}", e),
            Error::Validation { field, message } => {
                format!("⚠️ Invalid {}: {}", field, message)
            }
            Error::Tool(e) => format!("🔧 {} failed: {}", e.tool, e.message),
            Error::Workflow(msg) => format!("🧭 {}", msg),
            Error::Cancelled(_) => "⏹️ The operation was cancelled.".to_string(),
            Error::DeadlineExceeded(_) => "⏳ The operation took too long.".to_string(),
            Error::Configuration(msg) => format!("⚙️ Configuration error: {}", msg),
            Error::Internal(msg) => format!("❌ Internal error: {}", msg),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::NotFound(_) => Some(
                "💡 Run `conkit sessions list` to see the sessions that still exist.".to_string(),
            ),
            Error::Capacity(_) => Some(
                "💡 Run `conkit sessions gc` or raise `sessions.max_sessions`.".to_string(),
            ),
            Error::Persistence(PersistenceError::Locked { .. }) => {
                Some("💡 Stop the other conkit process and try again.".to_string())
            }
            Error::Tool(e) if e.retryable => Some("💡 Reply 'retry' to try again.".to_string()),
            Error::Workflow(_) => {
                Some("💡 Finish the earlier pipeline stage first.".to_string())
            }
            Error::Configuration(_) => Some(
                "💡 Check config/default.toml or the CONKIT_* environment variables.".to_string(),
            ),
            _ => None,
        }
    }
}

/// Format an error for display in the CLI
pub fn format_error_for_cli(error: &Error) -> String {
    let mut output = String::new();

    output.push_str(&error.user_message());
    output.push('\n');

    if let Some(suggestion) = error.suggestion() {
        output.push('\n');
        output.push_str(&suggestion);
        output.push('\n');
    }

    output
}

/// Format an error for display in a chat message
pub fn format_error_for_chat(error: &Error) -> String {
    let mut output = error.user_message();

    if let Some(suggestion) = error.suggestion() {
        output.push_str("\n\n");
        output.push_str(&suggestion);
    }

    output
}
