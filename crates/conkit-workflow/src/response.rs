//! Conversation responses

use conkit_core::ToolError;
use serde::{Deserialize, Serialize};

use crate::stage::Stage;
use crate::state::DecisionPoint;
use crate::tools::ToolCallRecord;

/// Outcome class of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// The stage did what was asked
    Success,
    /// Work is underway
    Processing,
    /// The user has to answer something
    WaitingInput,
    /// Succeeded with caveats
    Warning,
    /// A step failed; recovery options attached
    Error,
}

/// A selectable reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseOption {
    /// Value to send back
    pub id: String,
    /// Display text
    pub label: String,
    /// Longer explanation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Suggested choice
    #[serde(default)]
    pub recommended: bool,
}

impl ResponseOption {
    /// Plain option
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            recommended: false,
        }
    }

    /// Option marked as the suggested choice
    pub fn recommended(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            recommended: true,
            ..Self::new(id, label)
        }
    }

    /// Whether `input` selects this option by id or label
    #[must_use]
    pub fn matches(&self, input: &str) -> bool {
        let input = input.trim();
        self.id.eq_ignore_ascii_case(input) || self.label.eq_ignore_ascii_case(input)
    }
}

/// Continuation the engine may take without user input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoAdvance {
    /// Input to feed the next turn
    pub default_action: String,
}

/// Input fed to a turn when no explicit action is given
pub const DEFAULT_CONTINUE_ACTION: &str = "continue";

/// Reply to one conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationResponse {
    /// Session the turn ran in
    pub session_id: String,
    /// Text for the user
    pub message: String,
    /// Stage after the turn
    pub stage: Stage,
    /// Outcome class
    pub status: ResponseStatus,
    /// Replies the user can pick
    #[serde(default)]
    pub options: Vec<ResponseOption>,
    /// Progress marker such as `[Step 4/7]`
    #[serde(default)]
    pub progress: Option<String>,
    /// The turn cannot continue without the user
    pub requires_input: bool,
    /// Continuation available under autopilot
    #[serde(default)]
    pub auto_advance: Option<AutoAdvance>,
    /// Open question the next input answers
    #[serde(default)]
    pub decision: Option<DecisionPoint>,
    /// Tool failure behind an error status
    #[serde(default)]
    pub tool_error: Option<ToolError>,
    /// Tool calls made during the turn
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    /// Session writes that stayed in memory only
    #[serde(default)]
    pub persistence_warnings: Vec<String>,
    /// Autopilot is on for the session
    #[serde(default)]
    pub autopilot: bool,
    /// Turns taken automatically before this reply
    #[serde(default)]
    pub auto_advanced_steps: usize,
}

impl ConversationResponse {
    /// Response that waits for the user
    pub fn new(stage: Stage, status: ResponseStatus, message: impl Into<String>) -> Self {
        Self {
            session_id: String::new(),
            message: message.into(),
            stage,
            status,
            options: Vec::new(),
            progress: None,
            requires_input: true,
            auto_advance: None,
            decision: None,
            tool_error: None,
            tool_calls: Vec::new(),
            persistence_warnings: Vec::new(),
            autopilot: false,
            auto_advanced_steps: 0,
        }
    }

    /// Successful response
    pub fn success(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(stage, ResponseStatus::Success, message)
    }

    /// Response asking the user something
    pub fn waiting(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(stage, ResponseStatus::WaitingInput, message)
    }

    /// Failed step carrying the tool error
    pub fn tool_failure(stage: Stage, message: impl Into<String>, error: ToolError) -> Self {
        Self {
            tool_error: Some(error),
            ..Self::new(stage, ResponseStatus::Error, message)
        }
    }

    /// Attach options
    #[must_use]
    pub fn with_options(mut self, options: Vec<ResponseOption>) -> Self {
        self.options = options;
        self
    }

    /// Attach a decision point and its options
    #[must_use]
    pub fn with_decision(mut self, decision: DecisionPoint) -> Self {
        if self.options.is_empty() {
            self.options = decision.options.clone();
        }
        self.status = ResponseStatus::WaitingInput;
        self.requires_input = true;
        self.decision = Some(decision);
        self
    }

    /// Mark the response as continuable with `action`
    #[must_use]
    pub fn continue_with(mut self, action: impl Into<String>) -> Self {
        self.requires_input = false;
        self.auto_advance = Some(AutoAdvance {
            default_action: action.into(),
        });
        self
    }

    /// Input the next automatic turn sends
    #[must_use]
    pub fn next_action(&self) -> &str {
        self.auto_advance
            .as_ref()
            .map_or(DEFAULT_CONTINUE_ACTION, |a| a.default_action.as_str())
    }

    /// Whether the turn can proceed without the user at all
    #[must_use]
    pub fn can_auto_advance(&self) -> bool {
        !self.requires_input
            && self.decision.is_none()
            && !matches!(self.status, ResponseStatus::Error | ResponseStatus::WaitingInput)
    }

    /// Whether the engine should take the next turn itself
    #[must_use]
    pub fn should_auto_advance(&self) -> bool {
        self.autopilot && self.auto_advance.is_some() && self.can_auto_advance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_response_waits_for_input() {
        let response = ConversationResponse::success(Stage::Build, "built");
        assert!(response.requires_input);
        assert!(!response.can_auto_advance());
        assert_eq!(response.next_action(), "continue");
    }

    #[test]
    fn test_auto_advance_needs_autopilot() {
        let mut response = ConversationResponse::success(Stage::Build, "built").continue_with("push");
        assert!(response.can_auto_advance());
        assert!(!response.should_auto_advance());

        response.autopilot = true;
        assert!(response.should_auto_advance());
        assert_eq!(response.next_action(), "push");
    }

    #[test]
    fn test_errors_never_auto_advance() {
        let mut response = ConversationResponse::tool_failure(
            Stage::Deployment,
            "failed",
            ToolError::new("deploy_kubernetes", "deployment_error", "boom", true),
        )
        .continue_with("retry");
        response.autopilot = true;
        assert!(!response.should_auto_advance());
    }

    #[test]
    fn test_option_matching() {
        let option = ResponseOption::recommended("push", "Push to registry");
        assert!(option.matches(" PUSH "));
        assert!(option.matches("push to registry"));
        assert!(!option.matches("pushy"));
        assert!(option.recommended);
    }
}
