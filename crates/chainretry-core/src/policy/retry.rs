//! Retry policy: runs an operation until it succeeds or the policy gives up.
//!
//! One `execute` call walks a small state machine:
//! - attempt `n` runs the operation and captures its [`Attempt`]
//! - the error predicate (on failure) or result predicate (on success)
//!   decides whether the outcome triggers a retry
//! - if it does and `n < max_attempts`, the policy sleeps for the backoff
//!   delay (capped at `max_delay`) and runs attempt `n + 1`
//! - otherwise the attempt is final: metrics are recorded once and the
//!   value or error is returned

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::attempt::Attempt;
use crate::error::{ConfigError, Exhausted, RetryError};
use crate::metrics::{MetricsRegistry, RetryMetrics};
use crate::policy::backoff::Backoff;
use crate::policy::predicate::{Classify, Predicate};

/// Attempt budget used when none is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// A configured retry policy for operations producing `Result<T, E>`.
///
/// Built once and reused for many calls, concurrently if needed. Clones
/// share the same [`RetryMetrics`].
pub struct RetryPolicy<T, E> {
    name: Arc<str>,
    on_error: Predicate<E>,
    on_result: Predicate<T>,
    backoff: Backoff,
    max_attempts: u32,
    max_delay: Option<f64>,
    wrap_error: bool,
    raise_if_bad_result: bool,
    metrics: Arc<RetryMetrics>,
}

impl<T, E> RetryPolicy<T, E> {
    pub fn builder(name: impl Into<String>) -> RetryPolicyBuilder<T, E> {
        RetryPolicyBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Per-delay ceiling in seconds, if any.
    pub fn max_delay(&self) -> Option<f64> {
        self.max_delay
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn metrics(&self) -> &Arc<RetryMetrics> {
        &self.metrics
    }

    /// Runs `op` under this policy, blocking the current thread during
    /// backoff delays.
    pub fn execute<F>(&self, mut op: F) -> Result<T, RetryError<T, E>>
    where
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = Attempt::new(1, op());
        while let Some(delay) = self.next_delay(&attempt) {
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            attempt = Attempt::new(attempt.number() + 1, op());
        }
        self.finish(attempt)
    }

    /// Like [`execute`](Self::execute), forwarding a clone of `args` to
    /// every attempt.
    pub fn execute_with<A, F>(&self, args: A, mut op: F) -> Result<T, RetryError<T, E>>
    where
        A: Clone,
        F: FnMut(A) -> Result<T, E>,
    {
        self.execute(|| op(args.clone()))
    }

    /// Async variant of [`execute`](Self::execute); backoff delays suspend
    /// the task instead of blocking the thread.
    pub async fn execute_async<F, Fut>(&self, mut op: F) -> Result<T, RetryError<T, E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = Attempt::new(1, op().await);
        while let Some(delay) = self.next_delay(&attempt) {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt = Attempt::new(attempt.number() + 1, op().await);
        }
        self.finish(attempt)
    }

    /// Wraps `op` into a callable with the same argument that runs every
    /// call through this policy.
    pub fn wrap<A, F>(&self, op: F) -> impl Fn(A) -> Result<T, RetryError<T, E>>
    where
        A: Clone,
        F: Fn(A) -> Result<T, E>,
    {
        let policy = self.clone();
        move |args: A| policy.execute(|| op(args.clone()))
    }

    /// The capped delays this policy would apply after attempts
    /// `1..attempts`. Random strategies are sampled.
    pub fn delay_schedule(&self, attempts: u32) -> Vec<Duration> {
        (1..attempts).map(|n| self.capped_delay(n)).collect()
    }

    /// Decides whether `attempt` is retried and, if so, after which delay.
    fn next_delay(&self, attempt: &Attempt<T, E>) -> Option<Duration> {
        let triggered = match attempt.as_result() {
            Ok(value) => self.on_result.test(value),
            Err(e) => self.on_error.test(e),
        };
        if !triggered || attempt.number() >= self.max_attempts {
            return None;
        }

        let delay = self.capped_delay(attempt.number());
        tracing::debug!(
            policy = %self.name,
            attempt = attempt.number(),
            failed = attempt.is_failure(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "retrying"
        );
        Some(delay)
    }

    fn capped_delay(&self, attempt_number: u32) -> Duration {
        let delay = seconds_to_duration(self.backoff.delay(attempt_number));
        match self.max_delay {
            Some(max_delay) => delay.min(seconds_to_duration(max_delay)),
            None => delay,
        }
    }

    fn finish(&self, attempt: Attempt<T, E>) -> Result<T, RetryError<T, E>> {
        let attempts = attempt.number();
        let bad_result = self.raise_if_bad_result
            && attempt.value().is_some_and(|v| self.on_result.test(v));
        self.metrics.record(attempts, attempt.is_success() && !bad_result);

        if bad_result || (attempt.is_failure() && self.wrap_error) {
            tracing::warn!(
                policy = %self.name,
                attempts,
                bad_result,
                "retry exhausted"
            );
            return Err(RetryError::Exhausted(Exhausted::new(
                Arc::clone(&self.name),
                attempt,
            )));
        }
        if attempt.is_failure() && attempts > 1 {
            tracing::warn!(policy = %self.name, attempts, "operation failed after retries");
        }
        attempt.into_result().map_err(RetryError::Operation)
    }
}

/// Negative and NaN delays mean "no delay"; delays too large for a
/// `Duration` saturate.
fn seconds_to_duration(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

impl<T, E> Clone for RetryPolicy<T, E> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            on_error: self.on_error.clone(),
            on_result: self.on_result.clone(),
            backoff: self.backoff.clone(),
            max_attempts: self.max_attempts,
            max_delay: self.max_delay,
            wrap_error: self.wrap_error,
            raise_if_bad_result: self.raise_if_bad_result,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<T, E> fmt::Debug for RetryPolicy<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("name", &self.name)
            .field("on_error", &self.on_error)
            .field("on_result", &self.on_result)
            .field("backoff", &self.backoff)
            .field("max_attempts", &self.max_attempts)
            .field("max_delay", &self.max_delay)
            .field("wrap_error", &self.wrap_error)
            .field("raise_if_bad_result", &self.raise_if_bad_result)
            .finish()
    }
}

/// Builder for [`RetryPolicy`]. All validation happens in
/// [`build`](Self::build), before any attempt is made.
pub struct RetryPolicyBuilder<T, E> {
    name: String,
    on_error: Predicate<E>,
    on_result: Predicate<T>,
    backoff: Backoff,
    max_attempts: i64,
    max_delay: Option<f64>,
    wrap_error: bool,
    raise_if_bad_result: bool,
    metrics: Option<Arc<RetryMetrics>>,
    invalid: Option<ConfigError>,
}

impl<T, E> RetryPolicyBuilder<T, E> {
    /// Defaults: retry on any error, never on a result, 3 attempts, 0.5s
    /// fixed backoff, no delay cap.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_error: Predicate::always(),
            on_result: Predicate::never(),
            backoff: Backoff::default(),
            max_attempts: i64::from(DEFAULT_MAX_ATTEMPTS),
            max_delay: None,
            wrap_error: false,
            raise_if_bad_result: false,
            metrics: None,
            invalid: None,
        }
    }

    pub fn on_error(mut self, predicate: Predicate<E>) -> Self {
        self.on_error = predicate;
        self
    }

    pub fn on_result(mut self, predicate: Predicate<T>) -> Self {
        self.on_result = predicate;
        self
    }

    /// Total number of invocations allowed; must be at least 1.
    pub fn max_attempts(mut self, max_attempts: i64) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn backoff(mut self, backoff: impl Into<Backoff>) -> Self {
        self.backoff = backoff.into();
        self
    }

    /// Ceiling in seconds applied to every computed delay.
    pub fn max_delay(mut self, seconds: f64) -> Self {
        self.max_delay = Some(seconds);
        self
    }

    /// Report exhausted failures as [`RetryError::Exhausted`] instead of
    /// the operation's own error.
    pub fn wrap_error(mut self, wrap: bool) -> Self {
        self.wrap_error = wrap;
        self
    }

    /// Fail with [`RetryError::Exhausted`] when the final result still
    /// matches the result predicate.
    pub fn raise_if_bad_result(mut self, raise: bool) -> Self {
        self.raise_if_bad_result = raise;
        self
    }

    /// Record into existing metrics instead of a fresh set.
    pub fn metrics(mut self, metrics: Arc<RetryMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Record into the registry entry named after this policy.
    pub fn register_in(mut self, registry: &MetricsRegistry) -> Self {
        self.metrics = Some(registry.get_or_create(&self.name));
        self
    }

    pub fn build(self) -> Result<RetryPolicy<T, E>, ConfigError> {
        if let Some(err) = self.invalid {
            return Err(err);
        }
        let max_attempts = u32::try_from(self.max_attempts)
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::MaxAttempts(self.max_attempts))?;
        if let Some(max_delay) = self.max_delay {
            if max_delay.is_nan() || max_delay < 0.0 {
                return Err(ConfigError::MaxDelay(max_delay));
            }
        }
        self.backoff.validate()?;

        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(RetryMetrics::new(self.name.clone())));
        Ok(RetryPolicy {
            name: Arc::from(self.name),
            on_error: self.on_error,
            on_result: self.on_result,
            backoff: self.backoff,
            max_attempts,
            max_delay: self.max_delay,
            wrap_error: self.wrap_error,
            raise_if_bad_result: self.raise_if_bad_result,
            metrics,
        })
    }
}

impl<T, E: Classify + 'static> RetryPolicyBuilder<T, E> {
    /// Retry only on errors of `kind`.
    pub fn on_error_kind(self, kind: impl Into<String>) -> Self {
        let kind: String = kind.into();
        self.on_error_kinds([kind])
    }

    /// Retry only on errors of any of `kinds`.
    pub fn on_error_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match Predicate::any_of(kinds) {
            Ok(predicate) => self.on_error = predicate,
            Err(err) => {
                self.invalid.get_or_insert(err);
            }
        }
        self
    }
}
