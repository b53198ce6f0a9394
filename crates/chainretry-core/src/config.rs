//! Retry policy configuration.
//!
//! A [`RetryConfig`] is the serializable form of a policy's construction
//! options. Shapes mirror what callers can pass to the builder directly:
//!
//! ```json
//! {
//!   "name": "get_block",
//!   "on_error": { "kinds": ["timeout", "connection_reset"] },
//!   "on_result": { "equals": null },
//!   "max_attempts": 5,
//!   "backoff": { "type": "exponential", "initial": 0.1, "jitter": [0.0, 0.05] },
//!   "max_delay": 2.0
//! }
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::metrics::MetricsRegistry;
use crate::policy::backoff::{
    Backoff, DEFAULT_EXPONENTIAL_BASE, DEFAULT_FIBONACCI_LEN, MAX_FIBONACCI_LEN,
};
use crate::policy::predicate::{Classify, Predicate};
use crate::policy::retry::{RetryPolicy, RetryPolicyBuilder, DEFAULT_MAX_ATTEMPTS};

/// Which errors trigger a retry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTrigger {
    /// Every error.
    #[default]
    Any,
    /// No error.
    Never,
    /// Errors of a single kind.
    Kind(String),
    /// Errors of any of the listed kinds.
    Kinds(Vec<String>),
}

/// Which results trigger a retry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultTrigger {
    #[default]
    Never,
    /// Results whose JSON form equals this value; `null` matches `None`.
    Equals(serde_json::Value),
}

/// Backoff given as a bare number, a list of numbers, or a tagged strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BackoffConfig {
    Seconds(f64),
    Sequence(Vec<f64>),
    Strategy(BackoffStrategy),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed {
        seconds: f64,
    },
    Random {
        min: f64,
        max: f64,
    },
    Linear {
        initial: f64,
        increase: f64,
        /// `[low, high]` jitter range in seconds.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jitter: Option<(f64, f64)>,
    },
    Exponential {
        initial: f64,
        #[serde(default = "default_base")]
        base: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jitter: Option<(f64, f64)>,
    },
    Fibonacci {
        first: f64,
        second: f64,
        #[serde(default = "default_fibonacci_len")]
        len: usize,
    },
}

fn default_base() -> f64 { DEFAULT_EXPONENTIAL_BASE }
fn default_fibonacci_len() -> usize { DEFAULT_FIBONACCI_LEN }

impl From<&BackoffConfig> for Backoff {
    fn from(config: &BackoffConfig) -> Self {
        match config {
            BackoffConfig::Seconds(seconds) => Backoff::fixed(*seconds),
            BackoffConfig::Sequence(delays) => Backoff::sequence(delays.iter().copied()),
            BackoffConfig::Strategy(strategy) => strategy.into(),
        }
    }
}

impl From<&BackoffStrategy> for Backoff {
    fn from(strategy: &BackoffStrategy) -> Self {
        let with_jitter = |backoff: Backoff, jitter: &Option<(f64, f64)>| match jitter {
            Some((low, high)) => backoff.with_jitter_range(*low, *high),
            None => backoff,
        };
        match strategy {
            BackoffStrategy::Fixed { seconds } => Backoff::fixed(*seconds),
            BackoffStrategy::Random { min, max } => Backoff::random(*min, *max),
            BackoffStrategy::Linear {
                initial,
                increase,
                jitter,
            } => with_jitter(Backoff::linear(*initial, *increase), jitter),
            BackoffStrategy::Exponential {
                initial,
                base,
                jitter,
            } => with_jitter(Backoff::exponential_with_base(*initial, *base), jitter),
            BackoffStrategy::Fibonacci { first, second, len } => {
                Backoff::fibonacci_with_len(*first, *second, *len)
            }
        }
    }
}

/// Serializable retry policy options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Policy name, used in errors, logs and metrics.
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub on_error: ErrorTrigger,
    #[serde(default)]
    pub on_result: ResultTrigger,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,
    /// Absent means the 0.5s fixed default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffConfig>,
    /// Per-delay ceiling in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<f64>,
    #[serde(default)]
    pub wrap_error: bool,
    #[serde(default)]
    pub raise_if_bad_result: bool,
}

fn default_name() -> String { "retry".to_string() }
fn default_max_attempts() -> i64 { i64::from(DEFAULT_MAX_ATTEMPTS) }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            on_error: ErrorTrigger::default(),
            on_result: ResultTrigger::default(),
            max_attempts: default_max_attempts(),
            backoff: None,
            max_delay: None,
            wrap_error: false,
            raise_if_bad_result: false,
        }
    }
}

impl RetryConfig {
    /// Parse a config from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff.as_ref().map(Backoff::from).unwrap_or_default()
    }

    /// Resolve into a validated policy with its own metrics.
    pub fn into_policy<T, E>(&self) -> Result<RetryPolicy<T, E>, ConfigError>
    where
        T: Serialize + 'static,
        E: Classify + 'static,
    {
        self.builder()?.build()
    }

    /// Resolve into a policy recording into `registry` under its name.
    pub fn into_registered_policy<T, E>(
        &self,
        registry: &MetricsRegistry,
    ) -> Result<RetryPolicy<T, E>, ConfigError>
    where
        T: Serialize + 'static,
        E: Classify + 'static,
    {
        self.builder()?.register_in(registry).build()
    }

    fn builder<T, E>(&self) -> Result<RetryPolicyBuilder<T, E>, ConfigError>
    where
        T: Serialize + 'static,
        E: Classify + 'static,
    {
        if let Some(BackoffConfig::Strategy(BackoffStrategy::Fibonacci { len, .. })) = &self.backoff {
            if !(2..=MAX_FIBONACCI_LEN).contains(len) {
                return Err(ConfigError::Backoff(format!(
                    "fibonacci len must be between 2 and {MAX_FIBONACCI_LEN}, got {len}"
                )));
            }
        }

        let on_error = match &self.on_error {
            ErrorTrigger::Any => Predicate::always(),
            ErrorTrigger::Never => Predicate::never(),
            ErrorTrigger::Kind(kind) => Predicate::any_of([kind.as_str()])?,
            ErrorTrigger::Kinds(kinds) => Predicate::any_of(kinds.iter().map(String::as_str))?,
        };
        let on_result = match &self.on_result {
            ResultTrigger::Never => Predicate::never(),
            ResultTrigger::Equals(expected) => Predicate::equals_json(expected.clone()),
        };

        let mut builder = RetryPolicy::builder(self.name.clone())
            .on_error(on_error)
            .on_result(on_result)
            .max_attempts(self.max_attempts)
            .backoff(self.backoff())
            .wrap_error(self.wrap_error)
            .raise_if_bad_result(self.raise_if_bad_result);
        if let Some(max_delay) = self.max_delay {
            builder = builder.max_delay(max_delay);
        }
        Ok(builder)
    }
}

impl fmt::Display for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (max_attempts={}, backoff={:?}",
            self.name,
            self.max_attempts,
            self.backoff()
        )?;
        if let Some(max_delay) = self.max_delay {
            write!(f, ", max_delay={max_delay}s")?;
        }
        write!(f, ")")
    }
}
