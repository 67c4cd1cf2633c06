//! Conkit Workflow - Conversation State Machine
//!
//! This crate drives one containerization conversation per session through
//! the pipeline stages, including:
//! - Engine: Turn processing, decision routing and bounded auto-advance
//! - Stages: One handler per stage (analysis through deployment)
//! - Tools: Typed tool boundary, dispatcher with retry and session bookkeeping
//! - State: Conversation state persisted into session metadata
//! - Preferences: Per-user defaults for generation and deployment
//! - Recovery: Error classification and fallback options

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod preferences;
pub mod recovery;
pub mod response;
pub mod stage;
pub mod stages;
pub mod state;
pub mod tools;

#[cfg(test)]
mod test_support;

pub use engine::{TurnInput, WorkflowConfig, WorkflowEngine};
pub use preferences::{MemoryPreferenceStore, PreferenceStore, ResourceLimits, UserPreferences};
pub use response::{AutoAdvance, ConversationResponse, ResponseOption, ResponseStatus};
pub use stage::Stage;
pub use stages::{StageHandler, Turn};
pub use state::{
    Artifact, ConversationState, ConversationTurn, Decision, DecisionPoint, WorkflowContext,
};
pub use tools::{ToolCall, ToolCallRecord, ToolDispatcher, ToolOrchestrator, ToolRequest, ToolResponse};
