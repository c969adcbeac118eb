//! Retry executor integration tests

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use voxgate_foundation::{BackoffPolicy, CircuitBreakerConfig, RecoveryConfig, RetryPolicy};
use voxgate_resilience::{
    CircuitBreaker, CircuitState, ErrorTracker, RetryExecutor, SynthesisError, SynthesisErrorKind,
};

fn executor_with(breaker: CircuitBreakerConfig, policy: RetryPolicy) -> RetryExecutor {
    RetryExecutor::new(
        Arc::new(CircuitBreaker::new("test", breaker)),
        Arc::new(ErrorTracker::new(RecoveryConfig::default())),
        policy,
    )
}

/// Breaker that never trips within these tests
fn lenient_breaker() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        window_size: 100,
        ..Default::default()
    }
}

fn fast_policy(max_retries: u32) -> BackoffPolicy {
    BackoffPolicy::new(max_retries, 100, 1_000).with_jitter(0.0)
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_then_success() {
    let policy = RetryPolicy {
        rate_limited: fast_policy(3),
        ..RetryPolicy::no_retry()
    };
    let executor = executor_with(lenient_breaker(), policy.clone());
    let calls = Arc::new(AtomicU32::new(0));

    let result = executor
        .execute_with_retry(&policy, "synthesize", || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= 3 {
                    Err(SynthesisError::rate_limited(None))
                } else {
                    Ok(vec![1u8, 2, 3])
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(result, vec![1, 2, 3]);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(!executor.error_tracker().is_muted());
    assert_eq!(executor.breaker().stats().total_failures, 3);
    assert_eq!(executor.breaker().stats().total_successes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_invoked_once() {
    let executor = executor_with(lenient_breaker(), RetryPolicy::default());
    let calls = Arc::new(AtomicU32::new(0));

    let err = executor
        .execute("synthesize", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(SynthesisError::invalid_request("empty text"))
            }
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), SynthesisErrorKind::InvalidRequest);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let state = executor.error_tracker().snapshot();
    assert!(state.muted);
    assert_eq!(state.error_kind, Some(SynthesisErrorKind::InvalidRequest));
    assert_eq!(executor.breaker().stats().total_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_server_budget_exhausted() {
    let policy = RetryPolicy {
        server_error: fast_policy(2),
        ..RetryPolicy::no_retry()
    };
    let executor = executor_with(lenient_breaker(), policy.clone());
    let calls = Arc::new(AtomicU32::new(0));

    let err = executor
        .execute_with_retry(&policy, "synthesize", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(SynthesisError::server(503, "overloaded"))
            }
        })
        .await
        .unwrap_err();

    match &err {
        SynthesisError::RetryExhausted { attempts, last } => {
            assert_eq!(*attempts, 3);
            assert_eq!(last.status_code(), Some(503));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let state = executor.error_tracker().snapshot();
    assert_eq!(state.consecutive_failures, 1);
    assert_eq!(state.error_kind, Some(SynthesisErrorKind::RetryExhausted));
}

#[tokio::test(start_paused = true)]
async fn test_class_budgets_are_independent() {
    let policy = RetryPolicy {
        rate_limited: fast_policy(5),
        server_error: fast_policy(1),
        network: fast_policy(1),
    };
    let executor = executor_with(lenient_breaker(), policy.clone());
    let calls = Arc::new(AtomicU32::new(0));

    let err = executor
        .execute_with_retry(&policy, "synthesize", || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(match n {
                    0 => SynthesisError::server(500, "a"),
                    1 => SynthesisError::network("b"),
                    _ => SynthesisError::server(500, "c"),
                })
            }
        })
        .await
        .unwrap_err();

    // server retry spent on attempt 1, network retry on attempt 2, second server error ends it
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(err.root().message(), "c");
}

#[tokio::test(start_paused = true)]
async fn test_global_attempt_bound() {
    let policy = RetryPolicy::uniform(fast_policy(2));
    assert_eq!(policy.max_attempts(), 3);
    let executor = executor_with(lenient_breaker(), policy.clone());
    let calls = Arc::new(AtomicU32::new(0));

    let err = executor
        .execute_with_retry(&policy, "synthesize", || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(match n {
                    0 => SynthesisError::server(500, "a"),
                    1 => SynthesisError::network("b"),
                    _ => SynthesisError::rate_limited(None),
                })
            }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(matches!(err, SynthesisError::RetryExhausted { attempts: 3, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_short_circuits() {
    let executor = executor_with(
        CircuitBreakerConfig {
            window_size: 1,
            ..Default::default()
        },
        RetryPolicy::default(),
    );
    executor.breaker().record_failure();
    assert_eq!(executor.breaker().state(), CircuitState::Open);

    let calls = Arc::new(AtomicU32::new(0));
    let started = Instant::now();
    let err = executor
        .execute("synthesize", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, SynthesisError>(())
            }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SynthesisError::CircuitOpen));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(!executor.error_tracker().is_muted());
}

#[tokio::test(start_paused = true)]
async fn test_breaker_trips_during_retries() {
    let executor = executor_with(
        CircuitBreakerConfig {
            window_size: 2,
            failure_threshold: 0.5,
            ..Default::default()
        },
        RetryPolicy::uniform(fast_policy(5)),
    );
    let calls = Arc::new(AtomicU32::new(0));

    let err = executor
        .execute("synthesize", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(SynthesisError::timeout("slow upstream"))
            }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SynthesisError::CircuitOpen));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let state = executor.error_tracker().snapshot();
    assert!(state.muted);
    assert_eq!(state.error_kind, Some(SynthesisErrorKind::Timeout));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_backoff() {
    let executor = executor_with(
        lenient_breaker(),
        RetryPolicy::uniform(BackoffPolicy::new(3, 60_000, 60_000)),
    );
    let calls = Arc::new(AtomicU32::new(0));
    let token = executor.cancel_token().clone();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    });

    let started = Instant::now();
    let err = executor
        .execute("synthesize", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(SynthesisError::network("refused"))
            }
        })
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, SynthesisError::Cancelled));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_hint_sets_delay() {
    let policy = RetryPolicy {
        rate_limited: BackoffPolicy::new(1, 100, 10_000),
        ..RetryPolicy::no_retry()
    };
    let executor = executor_with(lenient_breaker(), policy.clone());
    let calls = Arc::new(AtomicU32::new(0));

    let started = Instant::now();
    executor
        .execute_with_retry(&policy, "synthesize", || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(SynthesisError::rate_limited(Some(Duration::from_secs(5))))
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_millis(5_050));
}

#[tokio::test(start_paused = true)]
async fn test_exponential_delays_accumulate() {
    let policy = RetryPolicy {
        server_error: BackoffPolicy::new(3, 1_000, 30_000).with_jitter(0.0),
        ..RetryPolicy::no_retry()
    };
    let executor = executor_with(lenient_breaker(), policy.clone());

    let started = Instant::now();
    let result = executor
        .execute_with_retry(&policy, "synthesize", || async {
            Err::<(), _>(SynthesisError::server(500, "down"))
        })
        .await;

    assert!(result.is_err());
    // 1s + 2s + 4s
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(7));
    assert!(elapsed < Duration::from_millis(7_050));
}

#[tokio::test(start_paused = true)]
async fn test_success_clears_previous_error_state() {
    let executor = executor_with(lenient_breaker(), RetryPolicy::no_retry());

    let _ = executor
        .execute("synthesize", || async {
            Err::<(), _>(SynthesisError::server(500, "down"))
        })
        .await;
    assert!(executor.error_tracker().is_muted());

    executor
        .execute("synthesize", || async { Ok::<_, SynthesisError>(()) })
        .await
        .unwrap();
    assert!(!executor.error_tracker().is_muted());
    assert_eq!(executor.error_tracker().snapshot().consecutive_failures, 0);
}
