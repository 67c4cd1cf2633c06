//! Conversation state
//!
//! The conversation layer lives inside the session's `metadata` map under
//! [`CONVERSATION_METADATA_KEY`]. It is restored at the start of a turn and
//! written back through `SessionManager::update` at the end.

use chrono::{DateTime, Utc};
use conkit_core::{Error, Result, SessionState, ToolError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::preferences::UserPreferences;
use crate::response::ResponseOption;
use crate::stage::Stage;

/// Turns kept in the history
pub const MAX_HISTORY: usize = 50;

/// Metadata key holding the serialized conversation
pub const CONVERSATION_METADATA_KEY: &str = "conversation";

/// A question that blocks the stage until answered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionPoint {
    /// Stable id, e.g. `repository`, `registry`, `k8s-config`
    pub id: String,
    /// Stage that asked
    pub stage: Stage,
    /// Question text
    pub question: String,
    /// Predefined answers
    #[serde(default)]
    pub options: Vec<ResponseOption>,
    /// Answer used when the user just continues
    #[serde(default)]
    pub default: Option<String>,
    /// The stage cannot proceed without an answer
    #[serde(default)]
    pub required: bool,
}

impl DecisionPoint {
    /// Required decision with no predefined answers
    pub fn new(id: impl Into<String>, stage: Stage, question: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stage,
            question: question.into(),
            options: Vec::new(),
            default: None,
            required: true,
        }
    }

    /// Attach predefined answers
    #[must_use]
    pub fn with_options(mut self, options: Vec<ResponseOption>) -> Self {
        self.options = options;
        self
    }

    /// Predefined answer selected by `input`, if any
    #[must_use]
    pub fn matching_option(&self, input: &str) -> Option<&ResponseOption> {
        self.options.iter().find(|o| o.matches(input))
    }
}

/// An answer to a [`DecisionPoint`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Decision being answered
    pub decision_id: String,
    /// Predefined answer chosen
    #[serde(default)]
    pub option_id: Option<String>,
    /// Free-form answer
    #[serde(default)]
    pub custom_value: Option<String>,
    /// When the answer was given
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    /// Answer by option id
    pub fn option(decision_id: impl Into<String>, option_id: impl Into<String>) -> Self {
        Self {
            decision_id: decision_id.into(),
            option_id: Some(option_id.into()),
            custom_value: None,
            timestamp: Utc::now(),
        }
    }

    /// Answer with a free-form value
    pub fn custom(decision_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            decision_id: decision_id.into(),
            option_id: None,
            custom_value: Some(value.into()),
            timestamp: Utc::now(),
        }
    }

    /// The value handed to the stage handler
    #[must_use]
    pub fn value(&self) -> &str {
        self.option_id
            .as_deref()
            .or(self.custom_value.as_deref())
            .unwrap_or_default()
    }
}

/// One user input and the reply it produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// What the user sent
    pub user_input: String,
    /// What was answered
    pub assistant_message: String,
    /// Stage the turn ended in
    pub stage: Stage,
    /// Tools called during the turn
    #[serde(default)]
    pub tools: Vec<String>,
    /// Decision resolved by the turn
    #[serde(default)]
    pub decision: Option<Decision>,
    /// When the turn finished
    pub timestamp: DateTime<Utc>,
    /// Taken by autopilot rather than the user
    #[serde(default)]
    pub automatic: bool,
}

/// Something a stage produced that the user may want to see
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Kind tag: `analysis`, `dockerfile`, `image`, `k8s-manifest`
    pub kind: String,
    /// Display name
    pub name: String,
    /// Content or reference
    pub content: String,
    /// Producing stage
    pub stage: Stage,
    /// When it was produced
    pub created_at: DateTime<Utc>,
}

/// Per-conversation working values shared between stages
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowContext {
    /// Application name for manifests and deployment
    pub app_name: Option<String>,
    /// A dry-run build preview was shown already
    pub build_dry_run_complete: bool,
    /// Deployment retries used so far
    pub deployment_retry_count: u32,
    /// Deployment applied but not yet confirmed healthy
    pub awaiting_health: bool,
    /// Stage that failed before entering the error stage
    pub failed_stage: Option<Stage>,
    /// Forward-compatible values with no typed field yet
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The conversation layer of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Owning session
    pub session_id: String,
    /// Current stage
    pub stage: Stage,
    /// Recent turns, oldest first
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    /// Effective preferences
    #[serde(default)]
    pub preferences: UserPreferences,
    /// Working values
    #[serde(default)]
    pub context: WorkflowContext,
    /// Produced artifacts
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    /// Open question, if any
    #[serde(default)]
    pub pending_decision: Option<DecisionPoint>,
    /// Most recent tool failure seen by the conversation
    #[serde(default)]
    pub last_tool_error: Option<ToolError>,
    /// Advance without waiting when a stage needs no input
    #[serde(default)]
    pub autopilot: bool,
    /// Pre-flight checks have passed
    #[serde(default)]
    pub preflight_passed: bool,
}

impl ConversationState {
    /// Fresh conversation at [`Stage::Init`]
    pub fn new(session_id: impl Into<String>, preferences: UserPreferences) -> Self {
        let autopilot = preferences.autopilot;
        Self {
            session_id: session_id.into(),
            stage: Stage::Init,
            history: Vec::new(),
            preferences,
            context: WorkflowContext::default(),
            artifacts: Vec::new(),
            pending_decision: None,
            last_tool_error: None,
            autopilot,
            preflight_passed: false,
        }
    }

    /// Conversation stored in `session`, or a fresh one seeded with `defaults`.
    ///
    /// An unreadable stored conversation is logged and replaced.
    pub fn restore(session: &SessionState, defaults: UserPreferences) -> Self {
        match session.metadata.get(CONVERSATION_METADATA_KEY) {
            Some(value) => match serde_json::from_value::<ConversationState>(value.clone()) {
                Ok(mut state) => {
                    state.session_id = session.session_id.clone();
                    state
                }
                Err(e) => {
                    warn!(
                        session_id = %session.session_id,
                        error = %e,
                        "Stored conversation is unreadable, starting over"
                    );
                    Self::new(&session.session_id, defaults)
                }
            },
            None => Self::new(&session.session_id, defaults),
        }
    }

    /// Write the conversation into `session.metadata`
    pub fn store_into(&self, session: &mut SessionState) -> Result<()> {
        let value = serde_json::to_value(self)
            .map_err(|e| Error::Internal(format!("failed to encode conversation: {}", e)))?;
        session
            .metadata
            .insert(CONVERSATION_METADATA_KEY.to_string(), value);
        Ok(())
    }

    /// Move to `stage`
    pub fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
    }

    /// Move to the error stage, remembering where the failure happened
    pub fn fail_into_error_stage(&mut self, failed: Stage) {
        self.context.failed_stage = Some(failed);
        self.stage = Stage::Error;
    }

    /// Record a turn, dropping the oldest beyond [`MAX_HISTORY`]
    pub fn add_turn(&mut self, turn: ConversationTurn) {
        self.history.push(turn);
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }

    /// Open a decision, replacing any other
    pub fn set_pending_decision(&mut self, decision: DecisionPoint) {
        self.pending_decision = Some(decision);
    }

    /// Close the pending decision with `decision`.
    ///
    /// Fails without changing anything when no decision is open or the ids
    /// differ.
    pub fn resolve_pending_decision(&mut self, decision: &Decision) -> Result<DecisionPoint> {
        match self.pending_decision.take() {
            Some(pending) if pending.id == decision.decision_id => Ok(pending),
            Some(pending) => {
                let err = Error::validation(
                    "decision",
                    format!(
                        "answers '{}' but the open question is '{}'",
                        decision.decision_id, pending.id
                    ),
                );
                self.pending_decision = Some(pending);
                Err(err)
            }
            None => Err(Error::validation(
                "decision",
                format!("no open question to answer with '{}'", decision.decision_id),
            )),
        }
    }

    /// Record an artifact
    pub fn add_artifact(&mut self, kind: &str, name: impl Into<String>, content: impl Into<String>) {
        self.artifacts.push(Artifact {
            kind: kind.to_string(),
            name: name.into(),
            content: content.into(),
            stage: self.stage,
            created_at: Utc::now(),
        });
    }

    /// Drop artifacts of `kind`
    pub fn clear_artifacts(&mut self, kind: &str) {
        self.artifacts.retain(|a| a.kind != kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::path::PathBuf;

    fn session() -> SessionState {
        SessionState::new("s1", PathBuf::from("/tmp/ws/s1"), Duration::hours(1))
    }

    #[test]
    fn test_restore_fresh_uses_defaults() {
        let prefs = UserPreferences {
            autopilot: true,
            ..UserPreferences::default()
        };
        let state = ConversationState::restore(&session(), prefs);
        assert_eq!(state.stage, Stage::Init);
        assert!(state.autopilot);
        assert_eq!(state.session_id, "s1");
    }

    #[test]
    fn test_store_and_restore() {
        let mut s = session();
        let mut state = ConversationState::new("s1", UserPreferences::default());
        state.set_stage(Stage::Build);
        state.context.app_name = Some("web".into());
        state.set_pending_decision(DecisionPoint::new("registry", Stage::Push, "Where?"));
        state.store_into(&mut s).unwrap();

        let restored = ConversationState::restore(&s, UserPreferences::default());
        assert_eq!(restored, state);
    }

    #[test]
    fn test_unreadable_conversation_starts_over() {
        let mut s = session();
        s.metadata
            .insert(CONVERSATION_METADATA_KEY.into(), serde_json::json!("garbage"));
        let state = ConversationState::restore(&s, UserPreferences::default());
        assert_eq!(state.stage, Stage::Init);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = ConversationState::new("s1", UserPreferences::default());
        for i in 0..(MAX_HISTORY + 7) {
            state.add_turn(ConversationTurn {
                user_input: format!("msg {}", i),
                assistant_message: String::new(),
                stage: Stage::Welcome,
                tools: Vec::new(),
                decision: None,
                timestamp: Utc::now(),
                automatic: false,
            });
        }
        assert_eq!(state.history.len(), MAX_HISTORY);
        assert_eq!(state.history[0].user_input, "msg 7");
    }

    #[test]
    fn test_resolve_requires_matching_id() {
        let mut state = ConversationState::new("s1", UserPreferences::default());
        assert!(state
            .resolve_pending_decision(&Decision::custom("repository", "x"))
            .is_err());

        state.set_pending_decision(DecisionPoint::new("repository", Stage::Welcome, "Which repo?"));
        let wrong = state.resolve_pending_decision(&Decision::custom("registry", "docker.io"));
        assert!(matches!(wrong, Err(Error::Validation { .. })));
        assert!(state.pending_decision.is_some());

        let resolved = state
            .resolve_pending_decision(&Decision::custom("repository", "https://github.com/a/b"))
            .unwrap();
        assert_eq!(resolved.id, "repository");
        assert!(state.pending_decision.is_none());
    }

    #[test]
    fn test_decision_value_prefers_option() {
        assert_eq!(Decision::option("registry", "gcr").value(), "gcr");
        assert_eq!(Decision::custom("registry", "ghcr.io").value(), "ghcr.io");
    }
}
