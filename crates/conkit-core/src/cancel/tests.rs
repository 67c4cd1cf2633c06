use super::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_completes_when_not_cancelled() {
    let ctx = CallContext::background();
    let value = cancelable(&ctx, "load", async { Ok(7) }).await.unwrap();
    assert_eq!(value, 7);
}

#[tokio::test]
async fn test_already_cancelled_fails_fast() {
    let ctx = CallContext::background();
    ctx.cancel();

    let ran = Arc::new(AtomicBool::new(false));
    let ran_clone = ran.clone();
    let result = cancelable(&ctx, "save", async move {
        ran_clone.store(true, Ordering::SeqCst);
        Ok(())
    })
    .await;

    assert!(matches!(result, Err(Error::Cancelled(op)) if op == "save"));
    assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_cancel_mid_call_returns_immediately() {
    let ctx = CallContext::background();
    let finished = Arc::new(AtomicBool::new(false));
    let finished_clone = finished.clone();

    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let started = std::time::Instant::now();
    let result = cancelable(&ctx, "save", async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        finished_clone.store(true, Ordering::SeqCst);
        Ok(())
    })
    .await;

    assert!(matches!(result, Err(Error::Cancelled(_))));
    assert!(started.elapsed() < Duration::from_millis(250));

    // The abandoned call is not aborted and completes on its own.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_deadline_exceeded() {
    let ctx = CallContext::background().with_timeout(Duration::from_millis(10));
    let result: Result<()> = cancelable(&ctx, "list", async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    })
    .await;

    assert!(matches!(result, Err(Error::DeadlineExceeded(op)) if op == "list"));
}

#[tokio::test]
async fn test_child_cancel_does_not_touch_parent() {
    let parent = CallContext::background();
    let child = parent.child();
    child.cancel();

    assert!(child.check("x").is_err());
    assert!(parent.check("x").is_ok());
}

#[tokio::test]
async fn test_timeout_keeps_earlier_deadline() {
    let outer = CallContext::background().with_timeout(Duration::from_millis(5));
    let inner = outer.with_timeout(Duration::from_secs(60));
    assert_eq!(inner.deadline(), outer.deadline());
}

#[tokio::test]
async fn test_sleep_interrupted_by_cancel() {
    let ctx = CallContext::background();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    let result = ctx.sleep(Duration::from_secs(30), "backoff").await;
    assert!(matches!(result, Err(Error::Cancelled(_))));
}

#[tokio::test]
async fn test_inner_error_is_returned() {
    let ctx = CallContext::background();
    let result: Result<()> =
        cancelable(&ctx, "delete", async { Err(Error::Internal("boom".into())) }).await;
    tokio_test::assert_err!(result);
}
