// tests/retry_tests.rs

use keywheel::{KeyPool, PoolConfig, Retrier, RetryError, StrategyKind};
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn make_pool(keys: &[&str], max_failures: u32) -> Arc<KeyPool> {
    let mut config = PoolConfig::with_keys(keys.iter().copied());
    config.strategy = StrategyKind::RoundRobin;
    config.max_failures = max_failures;
    Arc::new(KeyPool::new("test", &config).unwrap())
}

#[tokio::test]
async fn exhausts_budget_when_operation_always_fails() {
    let pool = make_pool(&["key-a", "key-b", "key-c"], 10);
    let retrier = Retrier::new(Arc::clone(&pool), 3, Duration::from_millis(10));
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let result: Result<(), _> = retrier
        .run(move |_key| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), String>("upstream 500".to_string())
            }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match result {
        Err(RetryError::Exhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert_eq!(last, "upstream 500");
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }

    // Every attempt reported a failure to the pool.
    let total_failures: u32 = pool.status().iter().map(|s| s.consecutive_failures).sum();
    assert_eq!(total_failures, 3);
}

#[tokio::test]
async fn returns_first_success_without_further_attempts() {
    let pool = make_pool(&["key-a", "key-b"], 3);
    let retrier = Retrier::new(Arc::clone(&pool), 3, Duration::from_millis(10));
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let result = retrier
        .run(move |key| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(format!("ok via {}", key.expose_secret()))
            }
        })
        .await;

    assert_eq!(result.unwrap(), "ok via key-a");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(pool.status()[0].consecutive_failures, 0);
}

#[tokio::test]
async fn recovers_after_two_failures_within_budget() {
    let pool = make_pool(&["key-a", "key-b", "key-c"], 10);
    let retrier = Retrier::new(Arc::clone(&pool), 3, Duration::from_millis(10));
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let result = retrier
        .run(move |_key| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("flaky".to_string())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn aborts_without_invoking_op_when_pool_is_exhausted() {
    let pool = make_pool(&["key-a"], 1);
    pool.report_failure("key-a");

    let retrier = Retrier::new(Arc::clone(&pool), 3, Duration::from_millis(10));
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let result: Result<(), _> = retrier
        .run(move |_key| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), String>(())
            }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let err = result.err().unwrap();
    assert!(err.last_error().is_none());
    assert!(matches!(err, RetryError::NoEligibleKeys));
}

#[tokio::test]
async fn stops_mid_call_when_last_key_is_quarantined() {
    // One key, threshold 1: the first failed attempt quarantines it, so the
    // second selection aborts the call even though budget remains.
    let pool = make_pool(&["key-a"], 1);
    let retrier = Retrier::new(Arc::clone(&pool), 3, Duration::from_millis(10));
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let result: Result<(), _> = retrier
        .run(move |_key| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), String>("boom".to_string())
            }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(result, Err(RetryError::NoEligibleKeys)));
}

#[tokio::test]
async fn failover_to_second_key_after_immediate_quarantine() {
    // Pool of 2, threshold 1, budget 2: whichever key fails first goes into
    // cooldown, the retry must land on the other key and succeed.
    let pool = make_pool(&["key-a", "key-b"], 1);
    let retrier = Retrier::new(Arc::clone(&pool), 2, Duration::from_millis(10));

    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let recorder = Arc::clone(&seen);
    let result = retrier
        .run(move |key| {
            let recorder = Arc::clone(&recorder);
            async move {
                let mut seen = recorder.lock().unwrap();
                let first_attempt = seen.is_empty();
                seen.push(key.expose_secret().clone());
                drop(seen);
                if first_attempt {
                    Err("quota exceeded".to_string())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "done");
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_ne!(seen[0], seen[1], "retry must use the other key");
}

#[tokio::test]
async fn waits_fixed_delay_between_attempts() {
    let pool = make_pool(&["key-a", "key-b"], 10);
    let retrier = Retrier::new(pool, 2, Duration::from_millis(100));

    let started = Instant::now();
    let result: Result<(), _> = retrier
        .run(|_key| async move { Err::<(), String>("slow down".to_string()) })
        .await;

    assert!(matches!(result, Err(RetryError::Exhausted { .. })));
    assert!(
        started.elapsed() >= Duration::from_millis(100),
        "one inter-attempt delay must elapse between the two attempts"
    );
}

#[tokio::test]
async fn from_config_uses_pool_budget_and_delay() {
    let mut config = PoolConfig::with_keys(["key-a"]);
    config.attempts = 2;
    config.retry_delay_ms = 10;
    config.max_failures = 10;
    let pool = Arc::new(KeyPool::new("test", &config).unwrap());

    let retrier = Retrier::from_config(Arc::clone(&pool), &config);
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let result: Result<(), _> = retrier
        .run(move |_key| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), String>("nope".to_string())
            }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    match result {
        Err(err @ RetryError::Exhausted { attempts: 2, .. }) => {
            assert_eq!(err.last_error(), Some(&"nope".to_string()));
        }
        other => panic!("expected Exhausted with 2 attempts, got {other:?}"),
    }
}
