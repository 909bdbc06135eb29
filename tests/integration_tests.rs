/// Integration tests for the failguard library
use failguard::{
    circuit_breaker::{CircuitBreaker, CircuitState},
    presets,
    retry::{ExponentialBackoffRetry, RetryError},
    Context, ContextError, MemoryLogger, RetryConfig,
};
use futures_util::future::join_all;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

async fn fail_once(cb: &CircuitBreaker<u32>, ctx: &Context) {
    let _ = cb
        .execute(
            ctx,
            || async { Err::<u32, _>("boom") },
            || async { Ok::<_, String>(0) },
        )
        .await;
}

// ==================== Circuit Breaker Tests ====================

#[tokio::test]
async fn test_closed_breaker_never_uses_fallback() {
    let cb = CircuitBreaker::<u32>::new(3, Duration::from_secs(1), None);
    let ctx = Context::background();
    let fallbacks = AtomicU32::new(0);

    for i in 0..50u32 {
        let result = cb
            .execute(
                &ctx,
                || async move { Ok::<_, String>(i) },
                || {
                    fallbacks.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, String>(u32::MAX) }
                },
            )
            .await;
        assert_eq!(assert_ok!(result), i);
    }

    assert_eq!(fallbacks.load(Ordering::SeqCst), 0);
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_timeout_scenario() {
    let cb = CircuitBreaker::<u32>::new(1, Duration::from_millis(100), None);
    let ctx = Context::background();
    let calls = AtomicU32::new(0);

    fail_once(&cb, &ctx).await;
    assert_eq!(cb.state(), CircuitState::Open);

    // 50ms in: still inside the recovery window
    tokio::time::sleep(Duration::from_millis(50)).await;
    let result = cb
        .execute(
            &ctx,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>(1) }
            },
            || async { Ok::<_, String>(0) },
        )
        .await;
    assert_eq!(result, Ok(0));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // 150ms in: the trial call runs and closes the circuit
    tokio::time::sleep(Duration::from_millis(100)).await;
    let result = cb
        .execute(
            &ctx,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>(1) }
            },
            || async { Ok::<_, String>(0) },
        )
        .await;
    assert_eq!(result, Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.failure_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_half_open_admits_single_trial() {
    let cb = CircuitBreaker::<u32>::new(1, Duration::from_millis(20), None);
    let ctx = Context::background();

    fail_once(&cb, &ctx).await;
    tokio::time::sleep(Duration::from_millis(40)).await;

    let callers = 16;
    let trials = Arc::new(AtomicU32::new(0));
    let barrier = Arc::new(Barrier::new(callers));

    let tasks = (0..callers).map(|_| {
        let cb = cb.clone();
        let ctx = ctx.clone();
        let trials = trials.clone();
        let barrier = barrier.clone();

        tokio::spawn(async move {
            barrier.wait().await;
            cb.execute(
                &ctx,
                || {
                    let trials = trials.clone();
                    async move {
                        trials.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok::<_, String>(1)
                    }
                },
                || async { Ok::<_, String>(0) },
            )
            .await
        })
    });

    let results: Vec<u32> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(trials.load(Ordering::SeqCst), 1);
    assert_eq!(results.iter().filter(|&&v| v == 1).count(), 1);
    assert_eq!(results.iter().filter(|&&v| v == 0).count(), callers - 1);
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_failures_open_circuit() {
    let threshold = 5;
    let cb = CircuitBreaker::<i32>::new(threshold, Duration::from_millis(100), None);
    let callers = 100;
    let barrier = Arc::new(Barrier::new(callers));

    let tasks = (0..callers).map(|_| {
        let cb = cb.clone();
        let barrier = barrier.clone();

        tokio::spawn(async move {
            barrier.wait().await;
            cb.execute(
                &Context::background(),
                || async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Err::<i32, _>("simulated failure")
                },
                || async { Ok::<_, String>(-1) },
            )
            .await
        })
    });

    for joined in join_all(tasks).await {
        assert_eq!(joined.unwrap(), Ok(-1));
    }

    assert_eq!(cb.state(), CircuitState::Open);
    assert!(cb.failure_count() > u64::from(threshold));
}

#[tokio::test(start_paused = true)]
async fn test_reset_from_every_state() {
    let cb = CircuitBreaker::<u32>::new(1, Duration::from_millis(10), None);
    let ctx = Context::background();

    cb.reset();
    assert_eq!(cb.state(), CircuitState::Closed);

    fail_once(&cb, &ctx).await;
    assert_eq!(cb.state(), CircuitState::Open);
    cb.reset();
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.failure_count(), 0);
    assert!(cb.last_failure_at().is_none());

    // Reset while a HalfOpen trial is in flight
    let parked = CircuitBreaker::<CircuitState>::new(1, Duration::from_millis(10), None);
    let _ = parked
        .execute(
            &ctx,
            || async { Err::<CircuitState, _>("boom") },
            || async { Ok::<_, String>(CircuitState::Open) },
        )
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let observer = parked.clone();
    let observed = parked
        .execute(
            &ctx,
            || async move {
                let seen = observer.state();
                observer.reset();
                Ok::<_, String>(seen)
            },
            || async { Ok::<_, String>(CircuitState::Open) },
        )
        .await;

    assert_eq!(observed, Ok(CircuitState::HalfOpen));
    assert_eq!(parked.state(), CircuitState::Closed);
    assert_eq!(parked.failure_count(), 0);
    assert!(parked.last_failure_at().is_none());
}

#[tokio::test]
async fn test_breaker_logs_through_injected_sink() {
    let logger = Arc::new(MemoryLogger::new());
    let cb = CircuitBreaker::<u32>::new(2, Duration::from_secs(60), Some(logger.clone()));
    let ctx = Context::background();

    fail_once(&cb, &ctx).await;
    assert!(!logger
        .records()
        .iter()
        .any(|r| r.message == "circuit breaker opened"));

    fail_once(&cb, &ctx).await;
    assert!(logger
        .records()
        .iter()
        .any(|r| r.message == "circuit breaker opened"));
}

// ==================== Retry Tests ====================

#[tokio::test(start_paused = true)]
async fn test_retry_succeeds_on_third_invocation() {
    let calls = AtomicU32::new(0);
    let retry = ExponentialBackoffRetry::new(
        || {
            let count = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if count < 3 {
                    Err("unsupported")
                } else {
                    Ok("ok")
                }
            }
        },
        Duration::from_millis(3),
        10,
        2,
        1,
        None,
    );

    let start = Instant::now();
    let result = retry.execute(&Context::background()).await;

    assert_eq!(assert_ok!(result), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(start.elapsed(), Duration::from_millis(3 + 6));
}

#[tokio::test(start_paused = true)]
async fn test_retry_waits_between_attempts() {
    let retry = ExponentialBackoffRetry::new(
        || async { Err::<i32, _>("persistent error") },
        Duration::from_millis(50),
        4,
        2,
        1,
        None,
    );

    let start = Instant::now();
    let result = retry.execute(&Context::background()).await;
    let elapsed = start.elapsed();

    // Expected: 50ms + 100ms + 200ms = 350ms minimum
    assert!(elapsed >= Duration::from_millis(350));
    let err = assert_err!(result);
    assert_eq!(err.into_last_error(), Some("persistent error"));
}

#[tokio::test(start_paused = true)]
async fn test_retry_cancelled_during_delay() {
    let calls = AtomicU32::new(0);
    let retry = ExponentialBackoffRetry::new(
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>("down") }
        },
        Duration::from_secs(1),
        5,
        2,
        1,
        None,
    );

    let ctx = Context::background();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let err = assert_err!(retry.execute(&ctx).await);

    assert!(matches!(err, RetryError::Context(ContextError::Cancelled)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_retry_instance_shared_by_concurrent_calls() {
    let calls = AtomicU32::new(0);
    let retry = ExponentialBackoffRetry::from_config(
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("flaky") }
        },
        RetryConfig::new(Duration::from_millis(5), 3, 2, 1),
        None,
    );
    let ctx = Context::background();

    let outcomes = join_all((0..8).map(|_| retry.execute(&ctx))).await;

    assert_eq!(calls.load(Ordering::SeqCst), 24);
    for outcome in outcomes {
        assert!(matches!(outcome, Err(RetryError::Exhausted { attempts: 3, .. })));
    }
}

// ==================== Combined Scenario Tests ====================

#[tokio::test(start_paused = true)]
async fn test_retry_around_circuit_breaker() {
    let cb = CircuitBreaker::<u32>::new(2, Duration::from_secs(60), None);
    let ctx = Context::background();
    let operations = Arc::new(AtomicU32::new(0));

    let retry = ExponentialBackoffRetry::new(
        || {
            let cb = cb.clone();
            let ctx = ctx.clone();
            let operations = operations.clone();
            async move {
                cb.execute(
                    &ctx,
                    move || {
                        operations.fetch_add(1, Ordering::SeqCst);
                        async { Err::<u32, _>("down") }
                    },
                    || async { Err::<u32, _>("degraded") },
                )
                .await
            }
        },
        Duration::from_millis(10),
        5,
        2,
        1,
        None,
    );

    let err = assert_err!(retry.execute(&ctx).await);

    assert!(matches!(
        err,
        RetryError::Exhausted {
            attempts: 5,
            last_error: "degraded"
        }
    ));
    // The breaker opened after two failures and shielded the rest
    assert_eq!(operations.load(Ordering::SeqCst), 2);
    assert_eq!(cb.state(), CircuitState::Open);
}

#[tokio::test]
async fn test_grpc_preset_breaker() {
    let config = presets::grpc_config();
    let cb = CircuitBreaker::<u32>::from_config(config.circuit_breaker, None);

    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.failure_threshold(), 5);

    let result = cb
        .execute(
            &Context::background(),
            || async { Ok::<_, String>(42) },
            || async { Ok::<_, String>(0) },
        )
        .await;
    assert_eq!(result, Ok(42));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_context_with_retry_preset() {
    let retry_config = presets::redis_config().retry.unwrap();
    let retry = ExponentialBackoffRetry::from_config(
        || async { Err::<(), _>("timeout") },
        retry_config,
        None,
    );

    // The 50ms backoff outlives a 10ms deadline
    let err = assert_err!(
        retry
            .execute(&Context::with_timeout(Duration::from_millis(10)))
            .await
    );
    assert_eq!(err.context_error(), Some(ContextError::DeadlineExceeded));
}
