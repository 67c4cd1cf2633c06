use super::*;
use crate::test_support::{happy_response, manager, scripted};
use conkit_core::{JobStatus, MemoryStore, RetryPolicy, SessionManager};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new()
        .with_max_attempts(3)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
        .with_jitter(false)
}

async fn setup(temp: &TempDir) -> (Arc<SessionManager>, CallContext) {
    let manager = manager(temp, Arc::new(MemoryStore::new()));
    let ctx = CallContext::background();
    manager.get_or_create(&ctx, Some("s1")).await.unwrap();
    (manager, ctx)
}

fn scan() -> ScanParams {
    ScanParams {
        image_ref: "web:latest".to_string(),
    }
}

/// Orchestrator that never answers
struct Hanging;

#[async_trait]
impl ToolOrchestrator for Hanging {
    async fn execute_tool(
        &self,
        _ctx: &CallContext,
        _request: ToolRequest,
        _session_id: &str,
    ) -> Result<ToolResponse, ToolError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(ToolError::new("scan_image", "timeout", "never answered", true))
    }
}

#[test]
fn test_request_wire_format() {
    let request: ToolRequest = scan().into();
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(
        value,
        json!({"tool": "scan_image", "params": {"image_ref": "web:latest"}})
    );
    assert_eq!(request.tool_name(), "scan_image");

    let back: ToolRequest = serde_json::from_value(value).unwrap();
    assert_eq!(back, request);
}

#[test]
fn test_extract_rejects_other_variants() {
    let response = happy_response(&ToolRequest::CheckHealth(HealthParams {
        app_name: "web".to_string(),
        namespace: "default".to_string(),
        timeout_seconds: 5,
    }));
    assert!(HealthParams::extract(response.clone()).is_some());
    assert!(ScanParams::extract(response.clone()).is_none());

    let err = unexpected_response(ScanParams::NAME, &response);
    assert_eq!(err.error_type, "unexpected_response");
    assert!(!err.retryable);
    assert!(err.message.contains("check_health"));
}

#[tokio::test]
async fn test_dispatch_records_job_and_execution() {
    let temp = TempDir::new().unwrap();
    let (manager, ctx) = setup(&temp).await;
    let (orchestrator, _) = scripted(|request| Ok(happy_response(request)));
    let dispatcher = ToolDispatcher::new(Arc::new(orchestrator), Arc::clone(&manager), fast_retry());

    let outcome = tokio_test::assert_ok!(dispatcher.dispatch(&ctx, "s1", scan()).await);

    let summary = outcome.result.unwrap();
    assert_eq!(summary.high, 1);
    assert!(outcome.warnings.is_empty());
    assert!(outcome.record.succeeded());
    assert_eq!(outcome.record.tool, "scan_image");
    assert_eq!(outcome.record.attempts, 1);

    let session = manager.get("s1").await.unwrap();
    let job = &session.active_jobs[&outcome.record.job_id];
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(session.execution_history.len(), 1);
    assert_eq!(session.execution_history[0].success, Some(true));
    assert!(session.last_error.is_none());
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let temp = TempDir::new().unwrap();
    let (manager, ctx) = setup(&temp).await;
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let (orchestrator, _) = scripted(move |request| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(ToolError::new("scan_image", "", "connection refused", true))
        } else {
            Ok(happy_response(request))
        }
    });
    let dispatcher = ToolDispatcher::new(Arc::new(orchestrator), Arc::clone(&manager), fast_retry());

    let outcome = dispatcher.dispatch(&ctx, "s1", scan()).await.unwrap();

    assert!(outcome.result.is_ok());
    assert_eq!(outcome.record.attempts, 2);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let temp = TempDir::new().unwrap();
    let (manager, ctx) = setup(&temp).await;
    let (orchestrator, calls) = scripted(|_| {
        Err(ToolError::new(
            "scan_image",
            "",
            "registry authentication required",
            true,
        ))
    });
    let dispatcher = ToolDispatcher::new(Arc::new(orchestrator), Arc::clone(&manager), fast_retry());

    let outcome = dispatcher.dispatch(&ctx, "s1", scan()).await.unwrap();

    let err = outcome.result.unwrap_err();
    assert_eq!(err.error_type, "authentication_error");
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(outcome.record.error.as_ref(), Some(&err));

    let session = manager.get("s1").await.unwrap();
    assert_eq!(session.last_error.as_ref(), Some(&err));
    assert_eq!(
        session.active_jobs[&outcome.record.job_id].status,
        JobStatus::Failed
    );
}

#[tokio::test]
async fn test_mismatched_response_is_rejected() {
    let temp = TempDir::new().unwrap();
    let (manager, ctx) = setup(&temp).await;
    let (orchestrator, _) = scripted(|_| {
        Ok(ToolResponse::RollbackDeployment(RollbackResult {
            image_ref: "web:old".to_string(),
        }))
    });
    let dispatcher = ToolDispatcher::new(Arc::new(orchestrator), Arc::clone(&manager), fast_retry());

    let outcome = dispatcher.dispatch(&ctx, "s1", scan()).await.unwrap();

    let err = outcome.result.unwrap_err();
    assert_eq!(err.error_type, "unexpected_response");
    assert_eq!(outcome.record.attempts, 1);
}

#[tokio::test]
async fn test_cancellation_interrupts_call() {
    let temp = TempDir::new().unwrap();
    let (manager, _) = setup(&temp).await;
    let dispatcher = ToolDispatcher::new(Arc::new(Hanging), Arc::clone(&manager), fast_retry());

    let ctx = CallContext::background();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        dispatcher.dispatch(&ctx, "s1", scan()),
    )
    .await
    .expect("dispatch should stop on cancellation")
    .unwrap_err();
    assert!(err.is_cancellation());

    let session = manager.get("s1").await.unwrap();
    assert!(session
        .active_jobs
        .values()
        .all(|job| job.status == JobStatus::Cancelled));
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let temp = TempDir::new().unwrap();
    let (manager, ctx) = setup(&temp).await;
    let (orchestrator, _) = scripted(|request| Ok(happy_response(request)));
    let dispatcher = ToolDispatcher::new(Arc::new(orchestrator), manager, fast_retry());

    let outcome = dispatcher.dispatch(&ctx, "missing", scan()).await.unwrap();

    // bookkeeping failures do not fail the call
    assert!(outcome.result.is_ok());
    assert!(!outcome.warnings.is_empty());
}
