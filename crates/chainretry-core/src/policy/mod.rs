//! Policy engine: retry triggers, delay strategies and the attempt loop.
//!
//! One retry sequence:
//! ```text
//! attempt → [Predicate] → [Backoff] → sleep → attempt → … → result
//! ```

pub mod backoff;
pub mod predicate;
pub mod retry;

pub use backoff::{Backoff, Jitter};
pub use predicate::{Classify, Predicate};
pub use retry::{RetryPolicy, RetryPolicyBuilder, DEFAULT_MAX_ATTEMPTS};
