//! Engine core structure
//!
//! Contains the `WorkflowEngine` struct and its builder methods.

use conkit_core::SessionManager;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::config::WorkflowConfig;
use crate::preferences::PreferenceStore;
use crate::stage::Stage;
use crate::stages::{default_handlers, StageHandler};
use crate::tools::{ToolDispatcher, ToolOrchestrator};

/// Drives conversations through the containerization stages
pub struct WorkflowEngine {
    pub(crate) manager: Arc<SessionManager>,
    pub(crate) dispatcher: ToolDispatcher,
    pub(crate) preferences: Arc<dyn PreferenceStore>,
    pub(crate) handlers: HashMap<Stage, Arc<dyn StageHandler>>,
    pub(crate) config: WorkflowConfig,
}

impl WorkflowEngine {
    /// Create an engine with the default stage handlers
    #[must_use]
    pub fn new(
        manager: Arc<SessionManager>,
        orchestrator: Arc<dyn ToolOrchestrator>,
        preferences: Arc<dyn PreferenceStore>,
        config: WorkflowConfig,
    ) -> Self {
        let dispatcher =
            ToolDispatcher::new(orchestrator, Arc::clone(&manager), config.tool_retry.clone());
        let handlers = default_handlers().into_iter().collect::<HashMap<_, _>>();

        info!(
            handlers = handlers.len(),
            max_auto_advance_steps = config.max_auto_advance_steps,
            "Workflow engine ready"
        );

        Self {
            manager,
            dispatcher,
            preferences,
            handlers,
            config,
        }
    }

    /// Replace the handler for `stage`
    #[must_use]
    pub fn with_handler(mut self, stage: Stage, handler: Arc<dyn StageHandler>) -> Self {
        self.handlers.insert(stage, handler);
        self
    }

    /// Session manager the engine runs on
    #[must_use]
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Engine configuration
    #[must_use]
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }
}
