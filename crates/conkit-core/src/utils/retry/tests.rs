use super::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[test]
fn test_retry_policy_defaults() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.initial_delay, Duration::from_secs(1));
    assert_eq!(policy.backoff_multiplier, 2.0);
    assert_eq!(policy.strategy, BackoffStrategy::Exponential);
}

#[test]
fn test_exponential_sequence_is_capped_and_non_decreasing() {
    let policy = RetryPolicy::new()
        .with_initial_delay(Duration::from_millis(200))
        .with_backoff_multiplier(2.0)
        .with_max_delay(Duration::from_secs(10))
        .with_jitter(false);

    let delays: Vec<Duration> = (1..=5).map(|a| policy.delay_for(a)).collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(200),
            Duration::from_millis(400),
            Duration::from_millis(800),
            Duration::from_millis(1600),
            Duration::from_millis(3200),
        ]
    );
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_delay_respects_max() {
    let policy = RetryPolicy::new()
        .with_initial_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(5))
        .with_backoff_multiplier(10.0)
        .with_jitter(false);

    // 1 * 10^2 = 100 seconds, clamped to 5
    assert_eq!(policy.delay_for(3), Duration::from_secs(5));
}

#[test]
fn test_linear_and_fixed_strategies() {
    let linear = RetryPolicy::new()
        .with_strategy(BackoffStrategy::Linear)
        .with_initial_delay(Duration::from_secs(2))
        .with_jitter(false);
    assert_eq!(linear.delay_for(1), Duration::from_secs(2));
    assert_eq!(linear.delay_for(3), Duration::from_secs(6));

    let fixed = RetryPolicy::new()
        .with_strategy(BackoffStrategy::Fixed)
        .with_initial_delay(Duration::from_millis(50))
        .with_jitter(false);
    assert_eq!(fixed.delay_for(4), Duration::from_millis(50));
}

#[test]
fn test_jitter_is_bounded() {
    let policy = RetryPolicy::new()
        .with_initial_delay(Duration::from_millis(1000))
        .with_jitter(true);

    for _ in 0..50 {
        let delay = policy.delay_for(1);
        assert!(delay >= Duration::from_millis(1000));
        assert!(delay <= Duration::from_millis(1100));
    }
}

#[test]
fn test_transient_patterns() {
    let policy = RetryPolicy::default();
    assert!(policy.is_transient("dial tcp: Connection refused"));
    assert!(policy.is_transient("registry returned 503"));
    assert!(!policy.is_transient("Dockerfile syntax error"));
}

#[tokio::test]
async fn test_retry_success_after_failures() {
    let policy = RetryPolicy::new()
        .with_max_attempts(3)
        .with_initial_delay(Duration::from_millis(1));
    let ctx = CallContext::background();
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let result: Result<i32, RetryError<&str>> = retry_with_backoff(
        &policy,
        &ctx,
        |_| {
            let c = counter_clone.clone();
            async move {
                let count = c.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err("transient error")
                } else {
                    Ok(42)
                }
            }
        },
        |_| true,
    )
    .await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_all_attempts_fail() {
    let policy = RetryPolicy::new()
        .with_max_attempts(3)
        .with_initial_delay(Duration::from_millis(1));
    let ctx = CallContext::background();

    let result: Result<i32, RetryError<&str>> = retry_with_backoff(
        &policy,
        &ctx,
        |_| async { Err::<i32, &str>("persistent error") },
        |_| true,
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.attempts(), 3);
    assert!(matches!(err, RetryError::Exhausted { .. }));
    assert_eq!(err.into_last_error(), "persistent error");
}

#[tokio::test]
async fn test_retry_non_retryable_error() {
    let policy = RetryPolicy::new()
        .with_max_attempts(3)
        .with_initial_delay(Duration::from_millis(1));
    let ctx = CallContext::background();
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let result: Result<i32, RetryError<&str>> = retry_with_backoff(
        &policy,
        &ctx,
        |_| {
            let c = counter_clone.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<i32, &str>("non-retryable error")
            }
        },
        |_| false,
    )
    .await;

    assert!(result.is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_cancelled_mid_backoff() {
    let policy = RetryPolicy::new()
        .with_max_attempts(5)
        .with_initial_delay(Duration::from_secs(30))
        .with_jitter(false);
    let ctx = CallContext::background();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let started = std::time::Instant::now();
    let result: Result<(), RetryError<&str>> =
        retry_with_backoff(&policy, &ctx, |_| async { Err("timeout") }, |_| true).await;

    assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1, .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_operation_sees_attempt_number() {
    let policy = RetryPolicy::new()
        .with_max_attempts(2)
        .with_initial_delay(Duration::from_millis(1));
    let ctx = CallContext::background();

    let result: Result<u32, RetryError<&str>> = retry_with_backoff(
        &policy,
        &ctx,
        |attempt| async move {
            if attempt == 1 {
                Err("locked")
            } else {
                Ok(attempt)
            }
        },
        |_| true,
    )
    .await;

    assert_eq!(result.unwrap(), 2);
}
