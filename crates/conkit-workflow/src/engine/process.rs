//! Engine turn processing
//!
//! Contains `handle_conversation`, the bounded auto-advance loop, and
//! `process_turn`, which runs exactly one stage step.

use chrono::Utc;
use conkit_core::validation::validate_message;
use conkit_core::{CallContext, Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::config::TurnInput;
use super::core::WorkflowEngine;
use crate::preferences::UserPreferences;
use crate::recovery::fallback_options;
use crate::response::{ConversationResponse, ResponseOption, ResponseStatus};
use crate::stage::Stage;
use crate::stages::{autopilot_toggle, StageHandler, Turn};
use crate::state::{ConversationState, ConversationTurn, Decision, DecisionPoint};
use crate::tools::PreflightParams;

impl WorkflowEngine {
    /// Process a user turn, then keep going on autopilot.
    ///
    /// After the user's turn, as long as the latest response may proceed
    /// without input and autopilot is on, the engine feeds the response's
    /// default action back in as the next input. At most
    /// `max_auto_advance_steps` such steps run per call. A failing automatic
    /// step ends the loop and the last good response is returned;
    /// cancellation is always returned as an error.
    #[tracing::instrument(skip(self, ctx, input), fields(session_id = ?input.session_id))]
    pub async fn handle_conversation(
        &self,
        ctx: &CallContext,
        input: TurnInput,
    ) -> Result<ConversationResponse> {
        let mut response = self.process_turn(ctx, &input, false).await?;
        let mut tool_calls = std::mem::take(&mut response.tool_calls);
        let mut warnings = std::mem::take(&mut response.persistence_warnings);
        let mut steps = 0;

        while steps < self.config.max_auto_advance_steps && response.should_auto_advance() {
            let next = TurnInput {
                session_id: Some(response.session_id.clone()),
                message: response.next_action().to_string(),
                decision: None,
                user_id: input.user_id.clone(),
            };
            debug!(
                session_id = %response.session_id,
                step = steps + 1,
                action = %next.message,
                "Auto-advancing"
            );

            match self.process_turn(ctx, &next, true).await {
                Ok(mut advanced) => {
                    steps += 1;
                    tool_calls.append(&mut advanced.tool_calls);
                    warnings.append(&mut advanced.persistence_warnings);
                    response = advanced;
                }
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    warn!(
                        session_id = %response.session_id,
                        error = %e,
                        "Automatic step failed, waiting for the user"
                    );
                    break;
                }
            }
        }

        if steps > 0 {
            info!(session_id = %response.session_id, steps, stage = %response.stage, "Auto-advance finished");
        }
        response.tool_calls = tool_calls;
        response.persistence_warnings = warnings;
        response.auto_advanced_steps = steps;
        Ok(response)
    }

    /// Run a single step of the conversation without auto-advancing
    pub async fn process_turn(
        &self,
        ctx: &CallContext,
        input: &TurnInput,
        automatic: bool,
    ) -> Result<ConversationResponse> {
        ctx.check("process turn")?;
        if input.decision.is_none() {
            validate_message(&input.message)?;
        }

        let session = self
            .manager
            .get_or_create(ctx, input.session_id.as_deref())
            .await?;
        let session_id = session.session_id.clone();

        let preferences = match self.preferences.load(ctx, input.user_id.as_deref()).await {
            Ok(preferences) => preferences,
            Err(e) if e.is_cancellation() => return Err(e),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to load preferences, using defaults");
                UserPreferences::default()
            }
        };
        let mut state = ConversationState::restore(&session, preferences.clone());
        state.preferences = preferences;
        if let Some(enabled) = autopilot_toggle(&input.message) {
            state.autopilot = enabled;
            info!(session_id = %session_id, enabled = state.autopilot, "Autopilot toggled");
        }

        let stage_before = state.stage;
        let mut turn = Turn::new(ctx, &session_id, &self.manager, &self.dispatcher, &self.config);
        let outcome = self.run_stage(&mut turn, &mut state, input).await;

        let mut response = match outcome {
            Ok(response) => response,
            Err(Error::Workflow(reason)) => {
                warn!(session_id = %session_id, stage = %state.stage, reason = %reason, "Stage cannot run");
                ConversationResponse::new(
                    state.stage,
                    ResponseStatus::Error,
                    format!("I can't continue with this step: {}", reason),
                )
                .with_options(fallback_options(state.stage, false))
            }
            Err(e) => return Err(e),
        };

        let decision = turn.decision().cloned();
        let (tool_calls, mut warnings) = turn.into_parts();
        state.add_turn(ConversationTurn {
            user_input: input.message.clone(),
            assistant_message: response.message.clone(),
            stage: state.stage,
            tools: tool_calls.iter().map(|call| call.tool.clone()).collect(),
            decision,
            timestamp: Utc::now(),
            automatic,
        });

        let saved = self
            .manager
            .update(ctx, &session_id, |s| state.store_into(s))
            .await;
        match saved {
            Ok(()) => {}
            Err(e) if e.is_persistence() => {
                warn!(session_id = %session_id, error = %e, "Conversation kept in memory only");
                warnings.push(e.to_string());
            }
            Err(e) => return Err(e),
        }

        if stage_before != state.stage {
            info!(
                session_id = %session_id,
                from = %stage_before,
                to = %state.stage,
                "Stage transition"
            );
        }

        response.session_id = session_id;
        response.stage = state.stage;
        response.progress = state.stage.progress_label();
        response.autopilot = state.autopilot;
        response.tool_calls = tool_calls;
        response.persistence_warnings = warnings;
        Ok(response)
    }

    async fn run_stage(
        &self,
        turn: &mut Turn<'_>,
        state: &mut ConversationState,
        input: &TurnInput,
    ) -> Result<ConversationResponse> {
        if self.config.require_preflight && !state.preflight_passed {
            return self.preflight(turn, state).await;
        }

        let mut text = input.message.clone();
        match (state.pending_decision.clone(), &input.decision) {
            (Some(pending), supplied) => {
                let decision = match supplied {
                    Some(decision) => decision.clone(),
                    None => {
                        let handler = self.handler_for(pending.stage)?;
                        if !handler.accepts(&pending, &input.message) {
                            return Ok(reprompt(pending));
                        }
                        answer_from_text(&pending, &input.message)
                    }
                };
                state.resolve_pending_decision(&decision)?;
                debug!(decision = %decision.decision_id, value = %decision.value(), "Decision resolved");
                text = decision.value().to_string();
                turn.set_decision(decision);
            }
            (None, Some(decision)) => {
                // no open question: reject before any stage runs
                state.resolve_pending_decision(decision)?;
            }
            (None, None) => {}
        }

        let handler = self.handler_for(state.stage)?;
        handler.handle(turn, state, &text).await
    }

    async fn preflight(
        &self,
        turn: &mut Turn<'_>,
        state: &mut ConversationState,
    ) -> Result<ConversationResponse> {
        let params = PreflightParams {
            checks: self.config.preflight_checks.clone(),
        };
        let retry = vec![ResponseOption::recommended("retry", "Run the checks again")];
        match turn.call(params).await? {
            Ok(report) if report.passed => {
                state.preflight_passed = true;
                if state.stage == Stage::Init {
                    state.set_stage(Stage::Welcome);
                }
                Ok(ConversationResponse::success(state.stage, "Pre-flight checks passed.")
                    .continue_with("continue"))
            }
            Ok(report) => Ok(ConversationResponse::new(
                state.stage,
                ResponseStatus::Error,
                format!(
                    "Pre-flight checks failed:\n- {}\n\nFix these and try again.",
                    report.failures.join("\n- ")
                ),
            )
            .with_options(retry)),
            Err(err) => Ok(ConversationResponse::tool_failure(
                state.stage,
                format!("Pre-flight checks could not run: {}", err.message),
                err,
            )
            .with_options(retry)),
        }
    }

    fn handler_for(&self, stage: Stage) -> Result<Arc<dyn StageHandler>> {
        self.handlers
            .get(&stage)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("no handler registered for stage {}", stage)))
    }
}

fn answer_from_text(pending: &DecisionPoint, text: &str) -> Decision {
    match pending.matching_option(text) {
        Some(option) => Decision::option(&pending.id, &option.id),
        None => Decision::custom(&pending.id, text.trim()),
    }
}

fn reprompt(pending: DecisionPoint) -> ConversationResponse {
    ConversationResponse::waiting(
        pending.stage,
        format!("I still need an answer before moving on. {}", pending.question),
    )
    .with_decision(pending)
}
