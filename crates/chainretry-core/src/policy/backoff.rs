//! Delay strategies between attempts.
//!
//! A [`Backoff`] maps the number of the attempt that just completed (1 for the
//! first attempt) to a delay in seconds:
//!
//! | Strategy      | `delay(n)`                                   |
//! |---------------|----------------------------------------------|
//! | `Fixed`       | `c`                                          |
//! | `Sequence`    | `v[min(n - 1, len - 1)]`                     |
//! | `Random`      | uniform in `[min, max]`, millisecond steps   |
//! | `Linear`      | `initial + increase * (n - 1)`               |
//! | `Exponential` | `initial * base^(n - 1)`                     |
//! | `Custom`      | `f(n)`                                       |
//!
//! Any strategy can be perturbed by an additive [`Jitter`] term.

use std::fmt;
use std::sync::Arc;

use rand::Rng;

use crate::error::ConfigError;

/// Delay used when no backoff is configured.
pub const DEFAULT_DELAY_SECS: f64 = 0.5;
pub const DEFAULT_EXPONENTIAL_BASE: f64 = 2.0;
/// Number of precomputed terms in a Fibonacci backoff.
pub const DEFAULT_FIBONACCI_LEN: usize = 16;
/// Upper bound on precomputed Fibonacci terms.
pub const MAX_FIBONACCI_LEN: usize = 64;

type DelayFn = Arc<dyn Fn(u32) -> f64 + Send + Sync>;
type JitterFn = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Additive random perturbation of a delay, evaluated independently on every
/// call.
#[derive(Clone, Default)]
pub enum Jitter {
    /// Contributes exactly zero.
    #[default]
    None,
    /// Uniform draw in `[low, high]` seconds with millisecond granularity.
    Range { low: f64, high: f64 },
    /// Caller-supplied source, in seconds.
    Custom(JitterFn),
}

impl Jitter {
    pub fn range(low: f64, high: f64) -> Self {
        Self::Range { low, high }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Draws one jitter value in seconds.
    pub fn sample(&self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Range { low, high } => random_seconds(*low, *high),
            Self::Custom(f) => f(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Range { low, high } => {
                if !low.is_finite() || !high.is_finite() || low > high {
                    return Err(ConfigError::Backoff(format!(
                        "jitter range ({low}, {high}) must be finite with low <= high"
                    )));
                }
                Ok(())
            }
            Self::None | Self::Custom(_) => Ok(()),
        }
    }
}

impl fmt::Debug for Jitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Range { low, high } => write!(f, "Range({low}..={high})"),
            Self::Custom(_) => write!(f, "Custom(<function>)"),
        }
    }
}

/// Delay strategy between attempts. Configuration is immutable; only the
/// random variants consult a (thread-local) random source.
#[derive(Clone)]
pub enum Backoff {
    /// The same delay after every attempt.
    Fixed(f64),
    /// Delays indexed by attempt number, holding the last entry once exhausted.
    Sequence(Vec<f64>),
    /// Uniform delay in `[min, max]`, independent of the attempt number.
    Random { min: f64, max: f64 },
    Linear { initial: f64, increase: f64 },
    Exponential { initial: f64, base: f64 },
    /// Caller-supplied `attempt_number -> seconds`.
    Custom(DelayFn),
    /// Another strategy plus an additive jitter term.
    Jittered { base: Box<Backoff>, jitter: Jitter },
}

impl Backoff {
    pub fn fixed(seconds: f64) -> Self {
        Self::Fixed(seconds)
    }

    pub fn sequence(delays: impl IntoIterator<Item = f64>) -> Self {
        Self::Sequence(delays.into_iter().collect())
    }

    pub fn random(min: f64, max: f64) -> Self {
        Self::Random { min, max }
    }

    pub fn linear(initial: f64, increase: f64) -> Self {
        Self::Linear { initial, increase }
    }

    /// Exponential growth with base 2.
    pub fn exponential(initial: f64) -> Self {
        Self::exponential_with_base(initial, DEFAULT_EXPONENTIAL_BASE)
    }

    pub fn exponential_with_base(initial: f64, base: f64) -> Self {
        Self::Exponential { initial, base }
    }

    /// A sequence backoff over the first [`DEFAULT_FIBONACCI_LEN`] terms of
    /// the Fibonacci-like series seeded with `first` and `second`.
    pub fn fibonacci(first: f64, second: f64) -> Self {
        Self::fibonacci_with_len(first, second, DEFAULT_FIBONACCI_LEN)
    }

    /// Like [`Backoff::fibonacci`] with `len` terms, clamped to
    /// `2..=MAX_FIBONACCI_LEN`.
    pub fn fibonacci_with_len(first: f64, second: f64, len: usize) -> Self {
        let len = len.clamp(2, MAX_FIBONACCI_LEN);
        let mut terms = Vec::with_capacity(len);
        terms.push(first);
        terms.push(second);
        while terms.len() < len {
            let n = terms.len();
            terms.push(terms[n - 1] + terms[n - 2]);
        }
        Self::Sequence(terms)
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u32) -> f64 + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Adds `jitter` on top of this strategy. `Jitter::None` leaves it as is.
    pub fn with_jitter(self, jitter: Jitter) -> Self {
        match jitter {
            Jitter::None => self,
            jitter => Self::Jittered {
                base: Box::new(self),
                jitter,
            },
        }
    }

    /// Shorthand for `with_jitter(Jitter::range(low, high))`.
    pub fn with_jitter_range(self, low: f64, high: f64) -> Self {
        self.with_jitter(Jitter::range(low, high))
    }

    /// Delay in seconds after attempt `attempt_number` (1-based).
    pub fn delay(&self, attempt_number: u32) -> f64 {
        let steps = attempt_number.saturating_sub(1);
        match self {
            Self::Fixed(seconds) => *seconds,
            Self::Sequence(delays) => {
                let idx = (steps as usize).min(delays.len().saturating_sub(1));
                delays.get(idx).copied().unwrap_or(0.0)
            }
            Self::Random { min, max } => random_seconds(*min, *max),
            Self::Linear { initial, increase } => initial + increase * f64::from(steps),
            Self::Exponential { initial, base } => {
                initial * base.powi(i32::try_from(steps).unwrap_or(i32::MAX))
            }
            Self::Custom(f) => f(attempt_number),
            Self::Jittered { base, jitter } => base.delay(attempt_number) + jitter.sample(),
        }
    }

    /// Rejects strategies that cannot produce sensible delays.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Fixed(seconds) => non_negative("fixed delay", *seconds),
            Self::Sequence(delays) => {
                if delays.is_empty() {
                    return Err(ConfigError::Backoff(
                        "a delay sequence must contain at least one delay".into(),
                    ));
                }
                delays
                    .iter()
                    .try_for_each(|d| non_negative("sequence delay", *d))
            }
            Self::Random { min, max } => {
                non_negative("random min", *min)?;
                non_negative("random max", *max)?;
                if min > max {
                    return Err(ConfigError::Backoff(format!(
                        "random backoff min ({min}) is greater than max ({max})"
                    )));
                }
                Ok(())
            }
            Self::Linear { initial, increase } => {
                non_negative("linear initial delay", *initial)?;
                finite("linear increase", *increase)
            }
            Self::Exponential { initial, base } => {
                non_negative("exponential initial delay", *initial)?;
                finite("exponential base", *base)?;
                if *base <= 0.0 {
                    return Err(ConfigError::Backoff(format!(
                        "exponential base must be positive, got {base}"
                    )));
                }
                Ok(())
            }
            Self::Custom(_) => Ok(()),
            Self::Jittered { base, jitter } => {
                base.validate()?;
                jitter.validate()
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Fixed(DEFAULT_DELAY_SECS)
    }
}

impl From<f64> for Backoff {
    fn from(seconds: f64) -> Self {
        Self::Fixed(seconds)
    }
}

impl From<u32> for Backoff {
    fn from(seconds: u32) -> Self {
        Self::Fixed(f64::from(seconds))
    }
}

impl From<Vec<f64>> for Backoff {
    fn from(delays: Vec<f64>) -> Self {
        Self::Sequence(delays)
    }
}

impl From<&[f64]> for Backoff {
    fn from(delays: &[f64]) -> Self {
        Self::Sequence(delays.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for Backoff {
    fn from(delays: [f64; N]) -> Self {
        Self::Sequence(delays.to_vec())
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(seconds) => f.debug_tuple("Fixed").field(seconds).finish(),
            Self::Sequence(delays) => f.debug_tuple("Sequence").field(delays).finish(),
            Self::Random { min, max } => f
                .debug_struct("Random")
                .field("min", min)
                .field("max", max)
                .finish(),
            Self::Linear { initial, increase } => f
                .debug_struct("Linear")
                .field("initial", initial)
                .field("increase", increase)
                .finish(),
            Self::Exponential { initial, base } => f
                .debug_struct("Exponential")
                .field("initial", initial)
                .field("base", base)
                .finish(),
            Self::Custom(_) => write!(f, "Custom(<function>)"),
            Self::Jittered { base, jitter } => f
                .debug_struct("Jittered")
                .field("base", base)
                .field("jitter", jitter)
                .finish(),
        }
    }
}

fn finite(what: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Backoff(format!("{what} must be finite, got {value}")))
    }
}

fn non_negative(what: &str, value: f64) -> Result<(), ConfigError> {
    finite(what, value)?;
    if value < 0.0 {
        return Err(ConfigError::Backoff(format!(
            "{what} must not be negative, got {value}"
        )));
    }
    Ok(())
}

/// Uniform draw of whole milliseconds in `[min, max]`, returned in seconds.
///
/// Uses the thread-local RNG, so concurrent callers never contend on shared
/// generator state.
fn random_seconds(min: f64, max: f64) -> f64 {
    let (low, high) = if min <= max { (min, max) } else { (max, min) };
    if !low.is_finite() || !high.is_finite() {
        return 0.0;
    }

    let low_ms = (low * 1000.0).round() as i64;
    let high_ms = (high * 1000.0).round() as i64;
    let millis = if low_ms < high_ms {
        rand::thread_rng().gen_range(low_ms..=high_ms)
    } else {
        low_ms
    };
    (millis as f64 / 1000.0).clamp(low, high)
}
