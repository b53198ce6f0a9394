//! Metrics reporting: structured `tracing` events and a JSON-ready report.

use chainretry_core::{MetricsRegistry, MetricsSnapshot};
use serde::Serialize;

/// Counters plus derived ratios for one policy. Ratios are `None` until the
/// policy has completed at least one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub name: String,
    #[serde(flatten)]
    pub counters: MetricsSnapshot,
    pub retry_attempts_per_call: Option<f64>,
    pub ratio_of_successful_calls_without_retry: Option<f64>,
    pub ratio_of_successful_calls_with_retry: Option<f64>,
    pub ratio_of_failed_calls_without_retry: Option<f64>,
    pub ratio_of_failed_calls_with_retry: Option<f64>,
}

impl MetricsReport {
    pub fn new(name: impl Into<String>, snapshot: MetricsSnapshot) -> Self {
        Self {
            name: name.into(),
            counters: snapshot,
            retry_attempts_per_call: snapshot.retry_attempts_per_call().ok(),
            ratio_of_successful_calls_without_retry: snapshot
                .ratio_of_successful_calls_without_retry()
                .ok(),
            ratio_of_successful_calls_with_retry: snapshot
                .ratio_of_successful_calls_with_retry()
                .ok(),
            ratio_of_failed_calls_without_retry: snapshot.ratio_of_failed_calls_without_retry().ok(),
            ratio_of_failed_calls_with_retry: snapshot.ratio_of_failed_calls_with_retry().ok(),
        }
    }

    /// One report per registered policy, sorted by name.
    pub fn from_registry(registry: &MetricsRegistry) -> Vec<Self> {
        registry
            .snapshot_all()
            .into_iter()
            .map(|(name, snapshot)| Self::new(name, snapshot))
            .collect()
    }
}

/// Emit one `retry.metrics` info event for `name`.
pub fn log_snapshot(name: &str, snapshot: &MetricsSnapshot) {
    tracing::info!(
        target: "retry.metrics",
        policy = name,
        total_calls = snapshot.total_calls,
        total_retry_attempts = snapshot.total_retry_attempts,
        successful_without_retry = snapshot.successful_calls_without_retry,
        successful_with_retry = snapshot.successful_calls_with_retry,
        failed_without_retry = snapshot.failed_calls_without_retry,
        failed_with_retry = snapshot.failed_calls_with_retry,
        retry_attempts_per_call = snapshot.retry_attempts_per_call().unwrap_or(0.0),
        "retry metrics"
    );
}

/// Emit a `retry.metrics` event for every policy in `registry`.
pub fn log_registry(registry: &MetricsRegistry) {
    for (name, snapshot) in registry.snapshot_all() {
        log_snapshot(&name, &snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainretry_core::RetryMetrics;

    #[test]
    fn empty_report_has_no_ratios() {
        let report = MetricsReport::new("idle", MetricsSnapshot::default());
        assert_eq!(report.retry_attempts_per_call, None);
        assert_eq!(report.ratio_of_failed_calls_with_retry, None);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["name"], "idle");
        assert_eq!(json["total_calls"], 0);
        assert!(json["ratio_of_successful_calls_without_retry"].is_null());
    }

    #[test]
    fn report_flattens_counters_and_ratios() {
        let metrics = RetryMetrics::new("get_block");
        metrics.record(1, true);
        metrics.record(3, true);
        metrics.record(2, false);
        metrics.record(1, true);

        let report = MetricsReport::new(metrics.name(), metrics.snapshot());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_calls"], 4);
        assert_eq!(json["total_retry_attempts"], 3);
        assert_eq!(json["successful_calls_with_retry"], 1);
        assert_eq!(json["ratio_of_successful_calls_without_retry"], 0.5);
        assert_eq!(json["retry_attempts_per_call"], 0.75);
    }

    #[test]
    fn registry_reports_are_sorted() {
        let registry = MetricsRegistry::new();
        registry.get_or_create("send_tx").record(1, false);
        registry.get_or_create("get_logs").record(2, true);

        let reports = MetricsReport::from_registry(&registry);
        let names: Vec<_> = reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["get_logs", "send_tx"]);
        assert_eq!(reports[1].counters.failed_calls_without_retry, 1);

        // no subscriber installed; must not panic
        log_registry(&registry);
    }
}
