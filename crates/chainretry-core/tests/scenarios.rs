//! End-to-end retry scenarios: attempt counts, metrics classification and
//! concurrent reuse of one policy.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use chainretry_core::{
    Backoff, Classify, ConfigError, MetricsError, MetricsRegistry, Predicate, RetryConfig,
    RetryError, RetryPolicy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Timeout,
    Connection,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

impl std::error::Error for Failure {}

impl Classify for Failure {
    fn kind(&self) -> &str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
        }
    }
}

/// Succeeds on attempt `succeed_at` (0 = never), failing with `error` before.
fn flaky(succeed_at: u32, error: Failure) -> impl FnMut() -> Result<&'static str, Failure> {
    let mut attempt = 0;
    move || {
        attempt += 1;
        if attempt == succeed_at {
            Ok("done")
        } else {
            Err(error)
        }
    }
}

fn timeout_policy() -> RetryPolicy<&'static str, Failure> {
    RetryPolicy::builder("get_block")
        .on_error_kind("timeout")
        .max_attempts(3)
        .backoff(0.0)
        .build()
        .unwrap()
}

#[test]
fn always_failing_operation_runs_exactly_max_attempts() {
    for max_attempts in 1..=6u32 {
        let calls = AtomicU32::new(0);
        let delays = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&delays);
        let policy = RetryPolicy::<(), Failure>::builder("always_fails")
            .max_attempts(i64::from(max_attempts))
            .backoff(Backoff::custom(move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
                0.0
            }))
            .build()
            .unwrap();

        let result = policy.execute(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Failure::Timeout)
        });

        assert!(matches!(result, Err(RetryError::Operation(Failure::Timeout))));
        assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
        assert_eq!(delays.load(Ordering::SeqCst), max_attempts - 1);
    }
}

#[test]
fn sequence_backoff_schedule_over_seven_attempts() {
    let policy = RetryPolicy::<(), Failure>::builder("schedule")
        .max_attempts(7)
        .backoff(vec![0.3, 0.7, 1.0])
        .build()
        .unwrap();
    let schedule_ms: Vec<u64> = policy
        .delay_schedule(7)
        .iter()
        .map(|d| (d.as_secs_f64() * 1000.0).round() as u64)
        .collect();
    assert_eq!(schedule_ms, vec![300, 700, 1000, 1000, 1000, 1000]);
}

#[test]
fn first_try_successes_are_classified_without_retry() {
    let policy = timeout_policy();
    for _ in 0..10 {
        assert_eq!(policy.execute(flaky(1, Failure::Timeout)).unwrap(), "done");
    }

    let m = policy.metrics();
    assert_eq!(m.total_calls(), 10);
    assert_eq!(m.successful_calls_without_retry(), 10);
    assert_eq!(m.successful_calls_with_retry(), 0);
    assert_eq!(m.failed_calls_without_retry(), 0);
    assert_eq!(m.failed_calls_with_retry(), 0);
    assert_eq!(m.total_retry_attempts(), 0);
    assert_eq!(m.ratio_of_successful_calls_without_retry(), Ok(1.0));
    assert_eq!(m.retry_attempts_per_call(), Ok(0.0));
}

#[test]
fn mixed_outcomes_are_counted_per_class() {
    let policy = timeout_policy();

    for _ in 0..3 {
        policy.execute(flaky(1, Failure::Timeout)).unwrap();
    }
    for _ in 0..5 {
        policy.execute(flaky(2, Failure::Timeout)).unwrap();
    }
    for _ in 0..2 {
        let err = policy.execute(flaky(0, Failure::Connection)).unwrap_err();
        assert!(matches!(err, RetryError::Operation(Failure::Connection)));
    }
    for _ in 0..4 {
        let err = policy.execute(flaky(0, Failure::Timeout)).unwrap_err();
        assert!(matches!(err, RetryError::Operation(Failure::Timeout)));
    }

    let s = policy.metrics().snapshot();
    assert_eq!(s.total_calls, 14);
    assert_eq!(s.successful_calls_without_retry, 3);
    assert_eq!(s.successful_calls_with_retry, 5);
    assert_eq!(s.failed_calls_without_retry, 2);
    assert_eq!(s.failed_calls_with_retry, 4);
    assert_eq!(s.total_retry_attempts, 5 + 4 * 2);
    assert!(s.is_consistent());
}

#[test]
fn bad_result_forced_failure_counts_as_failed_with_retry() {
    let policy = RetryPolicy::<Option<u64>, Failure>::builder("receipt")
        .on_result(Predicate::is_none())
        .raise_if_bad_result(true)
        .max_attempts(4)
        .backoff(0.0)
        .build()
        .unwrap();

    let calls = AtomicU32::new(0);
    let err = policy
        .execute(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        })
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let RetryError::Exhausted(exhausted) = err else {
        panic!("expected the policy to give up");
    };
    assert_eq!(exhausted.policy(), "receipt");
    assert_eq!(exhausted.attempts(), 4);
    assert_eq!(exhausted.last_attempt().value(), Some(&None));

    let s = policy.metrics().snapshot();
    assert_eq!(s.failed_calls_with_retry, 1);
    assert_eq!(s.successful_calls_with_retry, 0);
}

#[test]
fn invalid_max_attempts_never_invokes_the_operation() {
    let calls = AtomicU32::new(0);
    for bad in [0, -1] {
        let built = RetryPolicy::<(), Failure>::builder("invalid")
            .max_attempts(bad)
            .build();
        assert!(matches!(&built, Err(ConfigError::MaxAttempts(n)) if *n == bad));
        if let Ok(policy) = built {
            let _ = policy.execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
    }
    assert!(RetryConfig::from_json(r#"{"max_attempts": 1.5}"#).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn fresh_policy_ratios_are_undefined() {
    let policy = timeout_policy();
    assert_eq!(
        policy.metrics().ratio_of_failed_calls_with_retry(),
        Err(MetricsError::DivisionUndefined)
    );
}

#[test]
fn one_policy_shared_across_threads_keeps_metrics_consistent() {
    let registry = MetricsRegistry::new();
    let policy = RetryPolicy::<u32, Failure>::builder("shared")
        .on_error_kind("timeout")
        .max_attempts(3)
        .backoff(Backoff::random(0.0, 0.002))
        .register_in(&registry)
        .build()
        .unwrap();

    let handles: Vec<_> = (0..8u32)
        .map(|worker| {
            let policy = policy.clone();
            thread::spawn(move || {
                for call in 0..50u32 {
                    let fail_first = (worker + call) % 4;
                    let mut attempt = 0;
                    let _ = policy.execute(|| {
                        attempt += 1;
                        if attempt > fail_first {
                            Ok(attempt)
                        } else {
                            Err(Failure::Timeout)
                        }
                    });
                    assert!(policy.metrics().snapshot().is_consistent());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let s = registry.snapshot_all()["shared"];
    assert_eq!(s.total_calls, 400);
    assert!(s.is_consistent());
    // fail_first cycles 0..=3 evenly: 0 → ok first try, 1 and 2 → ok after
    // retries, 3 → exhausts all 3 attempts.
    assert_eq!(s.successful_calls_without_retry, 100);
    assert_eq!(s.successful_calls_with_retry, 200);
    assert_eq!(s.failed_calls_with_retry, 100);
    assert_eq!(s.total_retry_attempts, 100 + 200 + 200);
}

#[tokio::test]
async fn async_policy_shared_across_tasks() {
    let policy = RetryPolicy::<u32, Failure>::builder("async")
        .max_attempts(2)
        .backoff(0.001)
        .wrap_error(true)
        .build()
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..16u32 {
        let policy = policy.clone();
        tasks.push(tokio::spawn(async move {
            policy
                .execute_async(|| async move {
                    if i % 2 == 0 {
                        Ok(i)
                    } else {
                        Err(Failure::Connection)
                    }
                })
                .await
        }));
    }

    let mut exhausted = 0;
    for task in tasks {
        if let Err(err) = task.await.unwrap() {
            assert!(err.is_exhausted());
            assert_eq!(err.operation_error(), Some(&Failure::Connection));
            exhausted += 1;
        }
    }
    assert_eq!(exhausted, 8);

    let s = policy.metrics().snapshot();
    assert_eq!(s.successful_calls_without_retry, 8);
    assert_eq!(s.failed_calls_with_retry, 8);
    assert_eq!(s.total_retry_attempts, 8);
}
