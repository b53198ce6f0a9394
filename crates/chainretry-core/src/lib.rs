//! chainretry-core: retry policy engine.
//!
//! # Overview
//!
//! A [`RetryPolicy`] invokes an operation until it succeeds, the attempt
//! budget runs out, or the configured predicates decide the outcome is
//! final. Between attempts it waits for a delay computed by a [`Backoff`]
//! strategy. The core crate defines:
//!
//! - [`Predicate`] / [`Classify`]: retry triggers on errors and results
//! - [`Backoff`] / [`Jitter`]: fixed, sequence, random, linear, exponential,
//!   Fibonacci and custom delay strategies
//! - [`Attempt`]: the immutable record of one invocation
//! - [`RetryPolicy`]: the attempt loop, blocking and async
//! - [`RetryMetrics`] / [`MetricsRegistry`]: outcome counters per policy
//! - [`config`] module: serde configuration resolved into a policy
//!
//! ```no_run
//! use chainretry_core::{Backoff, RetryPolicy};
//!
//! let policy = RetryPolicy::<u64, std::io::Error>::builder("fetch")
//!     .max_attempts(5)
//!     .backoff(Backoff::exponential(0.1).with_jitter_range(0.0, 0.05))
//!     .max_delay(2.0)
//!     .build()?;
//!
//! let value = policy.execute(|| Ok::<_, std::io::Error>(42))?;
//! assert_eq!(value, 42);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod attempt;
pub mod config;
pub mod error;
pub mod metrics;
pub mod policy;

pub use attempt::Attempt;
pub use config::RetryConfig;
pub use error::{ConfigError, Exhausted, MetricsError, RetryError};
pub use metrics::{MetricsRegistry, MetricsSnapshot, RetryMetrics};
pub use policy::{Backoff, Classify, Jitter, Predicate, RetryPolicy, RetryPolicyBuilder};
