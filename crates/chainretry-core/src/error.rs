//! Error types for the retry engine.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::attempt::Attempt;

/// Invalid retry configuration.
///
/// Raised synchronously while building a policy or loading a config file,
/// never in the middle of an execution.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `max_attempts` must be an integer greater than zero.
    #[error("`{0}` is not a valid value for `max_attempts`: it should be an integer greater than 0")]
    MaxAttempts(i64),

    /// `max_delay` must be a non-negative number of seconds.
    #[error("`{0}` is not a valid value for `max_delay`: it should be a non-negative number of seconds")]
    MaxDelay(f64),

    /// Malformed backoff strategy.
    #[error("invalid backoff: {0}")]
    Backoff(String),

    /// Malformed error or result predicate.
    #[error("invalid predicate: {0}")]
    Predicate(String),

    /// Config document could not be parsed.
    #[error("invalid retry config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Config file could not be read.
    #[error("failed to read retry config: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised when reading derived metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MetricsError {
    /// A ratio was requested before any call completed.
    #[error("ratio is undefined: no calls have been recorded yet")]
    DivisionUndefined,
}

/// Error returned by [`RetryPolicy::execute`](crate::RetryPolicy::execute).
#[derive(Debug)]
pub enum RetryError<T, E> {
    /// The operation's own error, propagated unchanged.
    Operation(E),
    /// The policy gave up: all attempts failed with `wrap_error` set, or the
    /// final result was rejected with `raise_if_bad_result` set.
    Exhausted(Exhausted<T, E>),
}

impl<T, E> RetryError<T, E> {
    /// Returns `true` if the policy itself gave up.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }

    /// The underlying operation error, if the final attempt failed.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Exhausted(exhausted) => exhausted.last_attempt().error(),
        }
    }

    /// Consumes the error, returning the underlying operation error, if any.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Exhausted(exhausted) => exhausted.into_last_attempt().into_result().err(),
        }
    }
}

impl<T: fmt::Debug, E: fmt::Display> fmt::Display for RetryError<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation(e) => e.fmt(f),
            Self::Exhausted(exhausted) => exhausted.fmt(f),
        }
    }
}

impl<T, E> std::error::Error for RetryError<T, E>
where
    T: fmt::Debug,
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Operation(e) => e.source(),
            Self::Exhausted(exhausted) => exhausted.source(),
        }
    }
}

/// A retry sequence the policy gave up on.
///
/// Carries the policy name and the final [`Attempt`], which holds either the
/// last error or the last (undesired) result.
#[derive(Debug)]
pub struct Exhausted<T, E> {
    policy: Arc<str>,
    last: Attempt<T, E>,
}

impl<T, E> Exhausted<T, E> {
    pub(crate) fn new(policy: Arc<str>, last: Attempt<T, E>) -> Self {
        Self { policy, last }
    }

    /// Name of the policy that gave up.
    pub fn policy(&self) -> &str {
        &self.policy
    }

    /// Number of attempts made.
    pub fn attempts(&self) -> u32 {
        self.last.number()
    }

    pub fn last_attempt(&self) -> &Attempt<T, E> {
        &self.last
    }

    pub fn into_last_attempt(self) -> Attempt<T, E> {
        self.last
    }
}

impl<T: fmt::Debug, E: fmt::Display> fmt::Display for Exhausted<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last.as_result() {
            Err(e) => write!(
                f,
                "retry `{}` failed after {} attempts due to the following error: {e}",
                self.policy,
                self.attempts()
            ),
            Ok(value) => write!(
                f,
                "retry `{}` failed after {} attempts due to an undesired result: {value:?}",
                self.policy,
                self.attempts()
            ),
        }
    }
}

impl<T, E> std::error::Error for Exhausted<T, E>
where
    T: fmt::Debug,
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.last
            .error()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
