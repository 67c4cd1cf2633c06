//! Workflow engine - conversation turn processing
//!
//! Ties the session manager, stage handlers, tool dispatcher and preference
//! store together.
//!
//! # Module Structure
//!
//! - `config`: Engine settings (`WorkflowConfig`) and turn input (`TurnInput`)
//! - `core`: `WorkflowEngine` struct and builder methods
//! - `process`: Single-turn processing and bounded auto-advance

mod config;
mod core;
mod process;


pub use self::core::WorkflowEngine;
pub use config::{TurnInput, WorkflowConfig};
