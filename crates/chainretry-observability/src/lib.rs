//! # chainretry-observability
//!
//! Logging setup and metrics reporting for ChainRetry.
//!
//! ## Structured logging
//! Text or JSON logs via `tracing-subscriber`, with a global level and
//! per-component overrides (`chainretry_core=debug` shows every retry).
//!
//! ## Metrics reports
//! [`report::log_snapshot`] emits one `retry.metrics` event per policy;
//! [`MetricsReport`] is the JSON form used by the CLI.

pub mod report;
pub mod tracing_setup;

pub use report::{log_registry, log_snapshot, MetricsReport};
pub use tracing_setup::{init_tracing, LogConfig};
