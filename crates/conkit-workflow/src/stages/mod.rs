//! Stage handlers
//!
//! One handler per working stage. A handler reads the session, may call tools
//! through the [`Turn`], writes results back through `SessionManager::update`
//! and moves the conversation to the next stage on success. Tool failures end
//! up in the response with recovery options; only cancellation and missing
//! sessions are returned as errors.

mod analysis;
mod build;
mod deployment;
mod dockerfile;
mod manifests;
mod push;
mod terminal;
mod welcome;


pub use analysis::AnalysisHandler;
pub use build::BuildHandler;
pub use deployment::DeploymentHandler;
pub use dockerfile::DockerfileHandler;
pub use manifests::ManifestsHandler;
pub use push::PushHandler;
pub use terminal::{CompletedHandler, ErrorStageHandler};
pub use welcome::WelcomeHandler;

use async_trait::async_trait;
use conkit_core::{CallContext, Result, SessionManager, SessionState, ToolError};
use std::sync::Arc;
use tracing::warn;

use crate::engine::WorkflowConfig;
use crate::response::ConversationResponse;
use crate::stage::Stage;
use crate::state::{ConversationState, Decision, DecisionPoint};
use crate::tools::{ToolCall, ToolCallRecord, ToolDispatcher};

/// Behavior of one stage
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Process `input` for the current stage
    async fn handle(
        &self,
        turn: &mut Turn<'_>,
        state: &mut ConversationState,
        input: &str,
    ) -> Result<ConversationResponse>;

    /// Whether free text answers the stage's open `decision`
    fn accepts(&self, decision: &DecisionPoint, input: &str) -> bool {
        decision.matching_option(input).is_some()
    }
}

/// Handlers for every stage, keyed by the stage they serve
pub fn default_handlers() -> Vec<(Stage, Arc<dyn StageHandler>)> {
    let welcome: Arc<dyn StageHandler> = Arc::new(WelcomeHandler);
    vec![
        (Stage::Init, welcome.clone()),
        (Stage::Welcome, welcome),
        (Stage::Analysis, Arc::new(AnalysisHandler)),
        (Stage::Dockerfile, Arc::new(DockerfileHandler)),
        (Stage::Build, Arc::new(BuildHandler)),
        (Stage::Push, Arc::new(PushHandler)),
        (Stage::Manifests, Arc::new(ManifestsHandler)),
        (Stage::Deployment, Arc::new(DeploymentHandler)),
        (Stage::Completed, Arc::new(CompletedHandler)),
        (Stage::Error, Arc::new(ErrorStageHandler)),
    ]
}

/// Services available to a handler during one turn
pub struct Turn<'a> {
    ctx: &'a CallContext,
    session_id: &'a str,
    manager: &'a SessionManager,
    tools: &'a ToolDispatcher,
    config: &'a WorkflowConfig,
    decision: Option<Decision>,
    tool_calls: Vec<ToolCallRecord>,
    warnings: Vec<String>,
}

impl<'a> Turn<'a> {
    pub(crate) fn new(
        ctx: &'a CallContext,
        session_id: &'a str,
        manager: &'a SessionManager,
        tools: &'a ToolDispatcher,
        config: &'a WorkflowConfig,
    ) -> Self {
        Self {
            ctx,
            session_id,
            manager,
            tools,
            config,
            decision: None,
            tool_calls: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Caller's context
    pub fn ctx(&self) -> &CallContext {
        self.ctx
    }

    /// Session the turn runs in
    pub fn session_id(&self) -> &str {
        self.session_id
    }

    /// Engine configuration
    pub fn config(&self) -> &WorkflowConfig {
        self.config
    }

    /// Decision answered by this turn's input, if any
    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    pub(crate) fn set_decision(&mut self, decision: Decision) {
        self.decision = Some(decision);
    }

    /// Current snapshot of the session
    pub async fn session(&self) -> Result<SessionState> {
        self.manager.get(self.session_id).await
    }

    /// Mutate the session through the manager.
    ///
    /// A change that reached memory but not the store is recorded as a
    /// warning on the turn instead of failing it.
    pub async fn update_session<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut SessionState) + Send,
    {
        let result = self
            .manager
            .update(self.ctx, self.session_id, |s| {
                f(s);
                Ok(())
            })
            .await;
        match result {
            Err(e) if e.is_persistence() => {
                self.record_persistence_failure(&e);
                Ok(())
            }
            other => other,
        }
    }

    /// Run a tool, keeping its call record for the response
    pub async fn call<C: ToolCall>(
        &mut self,
        params: C,
    ) -> Result<std::result::Result<C::Output, ToolError>> {
        let outcome = self.tools.dispatch(self.ctx, self.session_id, params).await?;
        self.tool_calls.push(outcome.record);
        self.warnings.extend(outcome.warnings);
        Ok(outcome.result)
    }

    pub(crate) fn record_persistence_failure(&mut self, error: &conkit_core::Error) {
        warn!(session_id = %self.session_id, error = %error, "Session change kept in memory only");
        self.warnings.push(error.to_string());
    }

    pub(crate) fn into_parts(self) -> (Vec<ToolCallRecord>, Vec<String>) {
        (self.tool_calls, self.warnings)
    }
}

/// Whether `input` mentions any of `words`, case-insensitively
pub(crate) fn mentions(input: &str, words: &[&str]) -> bool {
    let input = input.to_lowercase();
    words.iter().any(|w| input.contains(w))
}

/// Autopilot setting requested by `input`, if it names autopilot.
///
/// Only "off", "disable" or "stop" directly beside "autopilot" turn it off;
/// any other mention turns it on.
pub(crate) fn autopilot_toggle(input: &str) -> Option<bool> {
    let input = input.to_lowercase();
    let words: Vec<&str> = input
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();
    let mut named = false;
    for (i, word) in words.iter().enumerate() {
        if *word != "autopilot" {
            continue;
        }
        named = true;
        let before = i.checked_sub(1).and_then(|j| words.get(j));
        let after = words.get(i + 1);
        if [before, after]
            .into_iter()
            .flatten()
            .any(|w| matches!(*w, "off" | "disable" | "stop"))
        {
            return Some(false);
        }
    }
    named.then_some(true)
}

/// Application name derived from the repository, as a DNS label
pub(crate) fn suggest_app_name(session: &SessionState) -> String {
    let source = session
        .repo_url
        .as_deref()
        .or(session.repo_path.as_deref())
        .unwrap_or_default();
    let last = source
        .trim_end_matches('/')
        .rsplit(['/', ':', '\\'])
        .next()
        .unwrap_or_default()
        .trim_end_matches(".git");

    let mut name: String = last
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    name.truncate(63);
    let name = name.trim_matches('-').to_string();
    if name.is_empty() {
        "app".to_string()
    } else {
        name
    }
}

/// Image reference to deploy: pushed reference first, then the local build
pub(crate) fn deployable_image(session: &SessionState) -> Option<String> {
    session.image_ref.clone().or_else(|| {
        session
            .dockerfile
            .image_id
            .clone()
            .filter(|_| session.dockerfile.built)
    })
}
