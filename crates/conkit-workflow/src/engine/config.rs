//! Engine configuration
//!
//! Contains configuration types for the engine:
//! - `WorkflowConfig` for engine settings
//! - `TurnInput` for one user turn

use conkit_core::RetryPolicy;
use std::time::Duration;

use crate::state::Decision;

/// Input for one conversation turn
#[derive(Debug, Clone)]
pub struct TurnInput {
    /// Existing session, or `None` to start a new one
    pub session_id: Option<String>,
    /// Free-text message
    pub message: String,
    /// Structured answer to the open decision point
    pub decision: Option<Decision>,
    /// User whose preferences apply
    pub user_id: Option<String>,
}

impl TurnInput {
    /// Create a new input
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            session_id: None,
            message: message.into(),
            decision: None,
            user_id: None,
        }
    }

    /// Continue an existing session
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Answer the open decision point
    #[must_use]
    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    /// Apply a user's stored preferences
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Configuration for the workflow engine
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Upper bound on unattended steps after one user turn
    pub max_auto_advance_steps: usize,
    /// Run pre-flight checks before the first stage
    pub require_preflight: bool,
    /// Checks requested from the orchestrator during pre-flight
    pub preflight_checks: Vec<String>,
    /// Deployment attempts before the conversation moves to the error stage
    pub deployment_max_retries: u32,
    /// Base delay between deployment retries, multiplied by the attempt count
    pub deployment_retry_delay: Duration,
    /// Backoff for transient tool failures
    pub tool_retry: RetryPolicy,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_auto_advance_steps: 5,
            require_preflight: false,
            preflight_checks: vec![
                "docker".to_string(),
                "kubectl".to_string(),
                "cluster".to_string(),
            ],
            deployment_max_retries: 3,
            deployment_retry_delay: Duration::from_secs(2),
            tool_retry: RetryPolicy::default(),
        }
    }
}

impl WorkflowConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the auto-advance bound
    #[must_use]
    pub fn with_max_auto_advance_steps(mut self, steps: usize) -> Self {
        self.max_auto_advance_steps = steps;
        self
    }

    /// Require pre-flight checks
    #[must_use]
    pub fn with_preflight(mut self, required: bool) -> Self {
        self.require_preflight = required;
        self
    }

    /// Set the deployment retry cap and base delay
    #[must_use]
    pub fn with_deployment_retries(mut self, max: u32, delay: Duration) -> Self {
        self.deployment_max_retries = max;
        self.deployment_retry_delay = delay;
        self
    }

    /// Set the tool retry policy
    #[must_use]
    pub fn with_tool_retry(mut self, policy: RetryPolicy) -> Self {
        self.tool_retry = policy;
        self
    }
}
