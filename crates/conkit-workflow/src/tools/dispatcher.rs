//! Tool dispatch with session bookkeeping and retries

use chrono::{DateTime, Utc};
use conkit_core::{
    retry_with_backoff, CallContext, Error, JobStatus, Result, RetryError, RetryPolicy,
    SessionManager, SessionState, ToolError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{unexpected_response, ToolCall, ToolOrchestrator, ToolRequest, ToolResponse};
use crate::recovery::classify_error;

/// What happened during one tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Tool name
    pub tool: String,
    /// Job id registered in the session
    pub job_id: String,
    /// Request sent
    pub request: ToolRequest,
    /// Result on success
    pub response: Option<ToolResponse>,
    /// Failure, if any
    pub error: Option<ToolError>,
    /// Attempts made, including retries
    pub attempts: u32,
    /// Wall time across all attempts
    pub duration_ms: u64,
    /// When dispatch began
    pub started_at: DateTime<Utc>,
}

impl ToolCallRecord {
    /// Whether the call produced a result
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Typed outcome of a dispatch
#[derive(Debug)]
pub struct ToolOutcome<T> {
    /// Call record for the response
    pub record: ToolCallRecord,
    /// Typed result or the tool failure
    pub result: std::result::Result<T, ToolError>,
    /// Session writes that did not reach the store
    pub warnings: Vec<String>,
}

/// Runs tools through an orchestrator for a session
///
/// Each dispatch registers a job and a tool execution in the session, retries
/// transient failures with backoff, records the final error as the session's
/// `last_error`, and rejects results that do not match the request.
pub struct ToolDispatcher {
    orchestrator: Arc<dyn ToolOrchestrator>,
    manager: Arc<SessionManager>,
    retry: RetryPolicy,
}

impl ToolDispatcher {
    /// Create a dispatcher
    pub fn new(
        orchestrator: Arc<dyn ToolOrchestrator>,
        manager: Arc<SessionManager>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            orchestrator,
            manager,
            retry,
        }
    }

    /// Retry policy for transient tool failures
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run `params` against the orchestrator.
    ///
    /// Tool failures come back inside the outcome. Only cancellation of
    /// `ctx` is returned as an error.
    #[instrument(skip_all, fields(tool = C::NAME, session_id = %session_id))]
    pub async fn dispatch<C: ToolCall>(
        &self,
        ctx: &CallContext,
        session_id: &str,
        params: C,
    ) -> Result<ToolOutcome<C::Output>> {
        ctx.check(C::NAME)?;

        let request: ToolRequest = params.into();
        let job_id = Uuid::new_v4().to_string();
        let execution_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let mut warnings = Vec::new();

        self.track(ctx, session_id, &mut warnings, |s| {
            s.start_job(job_id.clone(), C::NAME);
            s.begin_tool_execution(execution_id.clone(), C::NAME);
        })
        .await;

        let clock = Instant::now();
        let mut last_attempt = 0;
        let outcome = retry_with_backoff(
            &self.retry,
            ctx,
            |attempt| {
                last_attempt = attempt;
                let request = request.clone();
                async move { self.call_once::<C>(ctx, request, session_id).await }
            },
            |e: &ToolError| e.retryable && self.retry.is_transient(&e.message),
        )
        .await;
        let duration_ms = clock.elapsed().as_millis() as u64;

        let (result, attempts) = match outcome {
            Ok(value) => (Ok(value), last_attempt),
            Err(RetryError::Exhausted {
                last_error,
                attempts,
            }) => (Err(last_error), attempts),
            Err(RetryError::Cancelled { attempts, .. }) => {
                debug!(attempts = attempts, "Tool dispatch cancelled during backoff");
                self.track(ctx, session_id, &mut warnings, |s| {
                    s.set_job_status(&job_id, JobStatus::Cancelled, None, None);
                    s.finish_tool_execution(&execution_id, false, 0, Some("cancelled".into()));
                })
                .await;
                return Err(Error::Cancelled(C::NAME.to_string()));
            }
        };

        if result.is_err() {
            if let Err(cancelled) = ctx.check(C::NAME) {
                self.track(ctx, session_id, &mut warnings, |s| {
                    s.set_job_status(&job_id, JobStatus::Cancelled, None, None);
                    s.finish_tool_execution(&execution_id, false, 0, Some("cancelled".into()));
                })
                .await;
                return Err(cancelled);
            }
        }

        let (response, result) = match result {
            Ok((raw, output)) => (Some(raw), Ok(output)),
            Err(mut err) => {
                if err.error_type.is_empty() {
                    err.error_type = classify_error(&err.message).to_string();
                }
                (None, Err(err))
            }
        };
        let error = result.as_ref().err().cloned();

        self.track(ctx, session_id, &mut warnings, |s| match &error {
            None => {
                s.set_job_status(&job_id, JobStatus::Completed, Some("ok".into()), None);
                s.finish_tool_execution(&execution_id, true, 0, None);
            }
            Some(err) => {
                s.set_job_status(&job_id, JobStatus::Failed, None, Some(err.message.clone()));
                s.finish_tool_execution(&execution_id, false, 0, Some(err.message.clone()));
                s.last_error = Some(err.clone());
            }
        })
        .await;

        match &error {
            None => debug!(attempts = attempts, duration_ms = duration_ms, "Tool succeeded"),
            Some(err) => warn!(
                attempts = attempts,
                error_type = %err.error_type,
                error = %err.message,
                "Tool failed"
            ),
        }

        Ok(ToolOutcome {
            record: ToolCallRecord {
                tool: C::NAME.to_string(),
                job_id,
                request,
                response,
                error,
                attempts,
                duration_ms,
                started_at,
            },
            result,
            warnings,
        })
    }

    async fn call_once<C: ToolCall>(
        &self,
        ctx: &CallContext,
        request: ToolRequest,
        session_id: &str,
    ) -> std::result::Result<(ToolResponse, C::Output), ToolError> {
        let response = tokio::select! {
            biased;
            err = ctx.done(C::NAME) => {
                return Err(ToolError::new(C::NAME, "cancelled", err.to_string(), false));
            }
            response = self.orchestrator.execute_tool(ctx, request, session_id) => response?,
        };

        let raw = response.clone();
        match C::extract(response) {
            Some(output) => Ok((raw, output)),
            None => Err(unexpected_response(C::NAME, &raw)),
        }
    }

    async fn track<F>(&self, ctx: &CallContext, session_id: &str, warnings: &mut Vec<String>, f: F)
    where
        F: FnOnce(&mut SessionState) + Send,
    {
        let result = self
            .manager
            .update(ctx, session_id, |s| {
                f(s);
                Ok(())
            })
            .await;
        if let Err(e) = result {
            warn!(session_id = %session_id, error = %e, "Tool bookkeeping not saved");
            warnings.push(format!("tool bookkeeping not saved: {}", e));
        }
    }
}
