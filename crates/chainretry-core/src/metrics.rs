//! Per-policy retry outcome counters.
//!
//! Every completed `execute` call is recorded as one unit under a single
//! lock, so concurrent readers always observe
//! `successful_* + failed_* == total_calls`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::error::MetricsError;

/// A consistent copy of a policy's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    /// Attempts beyond the first, summed over all calls.
    pub total_retry_attempts: u64,
    pub successful_calls_without_retry: u64,
    pub successful_calls_with_retry: u64,
    pub failed_calls_without_retry: u64,
    pub failed_calls_with_retry: u64,
}

impl MetricsSnapshot {
    pub fn retry_attempts_per_call(&self) -> Result<f64, MetricsError> {
        self.ratio_of(self.total_retry_attempts)
    }

    pub fn ratio_of_successful_calls_without_retry(&self) -> Result<f64, MetricsError> {
        self.ratio_of(self.successful_calls_without_retry)
    }

    pub fn ratio_of_successful_calls_with_retry(&self) -> Result<f64, MetricsError> {
        self.ratio_of(self.successful_calls_with_retry)
    }

    pub fn ratio_of_failed_calls_without_retry(&self) -> Result<f64, MetricsError> {
        self.ratio_of(self.failed_calls_without_retry)
    }

    pub fn ratio_of_failed_calls_with_retry(&self) -> Result<f64, MetricsError> {
        self.ratio_of(self.failed_calls_with_retry)
    }

    /// Returns `true` if the four outcome classes add up to `total_calls`.
    pub fn is_consistent(&self) -> bool {
        self.successful_calls_without_retry
            + self.successful_calls_with_retry
            + self.failed_calls_without_retry
            + self.failed_calls_with_retry
            == self.total_calls
    }

    fn ratio_of(&self, count: u64) -> Result<f64, MetricsError> {
        if self.total_calls == 0 {
            return Err(MetricsError::DivisionUndefined);
        }
        Ok(count as f64 / self.total_calls as f64)
    }
}

/// Thread-safe running counters for one retry policy.
#[derive(Debug)]
pub struct RetryMetrics {
    name: String,
    counters: Mutex<MetricsSnapshot>,
}

impl RetryMetrics {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            counters: Mutex::new(MetricsSnapshot::default()),
        }
    }

    /// Name of the policy (or command) these counters belong to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records one finished retry sequence that made `attempts` attempts.
    pub fn record(&self, attempts: u32, succeeded: bool) {
        let retried = attempts > 1;
        let mut c = self.lock();
        c.total_calls += 1;
        c.total_retry_attempts += u64::from(attempts.saturating_sub(1));
        match (succeeded, retried) {
            (true, false) => c.successful_calls_without_retry += 1,
            (true, true) => c.successful_calls_with_retry += 1,
            (false, false) => c.failed_calls_without_retry += 1,
            (false, true) => c.failed_calls_with_retry += 1,
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        *self.lock()
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        *self.lock() = MetricsSnapshot::default();
    }

    pub fn total_calls(&self) -> u64 {
        self.snapshot().total_calls
    }

    pub fn total_retry_attempts(&self) -> u64 {
        self.snapshot().total_retry_attempts
    }

    pub fn successful_calls_without_retry(&self) -> u64 {
        self.snapshot().successful_calls_without_retry
    }

    pub fn successful_calls_with_retry(&self) -> u64 {
        self.snapshot().successful_calls_with_retry
    }

    pub fn failed_calls_without_retry(&self) -> u64 {
        self.snapshot().failed_calls_without_retry
    }

    pub fn failed_calls_with_retry(&self) -> u64 {
        self.snapshot().failed_calls_with_retry
    }

    pub fn retry_attempts_per_call(&self) -> Result<f64, MetricsError> {
        self.snapshot().retry_attempts_per_call()
    }

    pub fn ratio_of_successful_calls_without_retry(&self) -> Result<f64, MetricsError> {
        self.snapshot().ratio_of_successful_calls_without_retry()
    }

    pub fn ratio_of_successful_calls_with_retry(&self) -> Result<f64, MetricsError> {
        self.snapshot().ratio_of_successful_calls_with_retry()
    }

    pub fn ratio_of_failed_calls_without_retry(&self) -> Result<f64, MetricsError> {
        self.snapshot().ratio_of_failed_calls_without_retry()
    }

    pub fn ratio_of_failed_calls_with_retry(&self) -> Result<f64, MetricsError> {
        self.snapshot().ratio_of_failed_calls_with_retry()
    }

    // Every update is a complete unit, so a poisoned lock still guards
    // consistent counters.
    fn lock(&self) -> MutexGuard<'_, MetricsSnapshot> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Named collection of [`RetryMetrics`], owned by the host application.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    entries: Mutex<HashMap<String, Arc<RetryMetrics>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the metrics registered under `name`, creating them if needed.
    pub fn get_or_create(&self, name: &str) -> Arc<RetryMetrics> {
        let mut entries = self.lock();
        Arc::clone(
            entries
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RetryMetrics::new(name))),
        )
    }

    pub fn get(&self, name: &str) -> Option<Arc<RetryMetrics>> {
        self.lock().get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn snapshot_all(&self) -> BTreeMap<String, MetricsSnapshot> {
        self.lock()
            .iter()
            .map(|(name, metrics)| (name.clone(), metrics.snapshot()))
            .collect()
    }

    /// Unregisters `name`. Policies already holding its metrics keep them.
    pub fn remove(&self, name: &str) -> Option<Arc<RetryMetrics>> {
        self.lock().remove(name)
    }

    /// Resets every registered counter set. Registrations are kept so that
    /// policies built against this registry keep reporting into it.
    pub fn clear(&self) {
        for metrics in self.lock().values() {
            metrics.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<RetryMetrics>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fresh_metrics_have_undefined_ratios() {
        let m = RetryMetrics::new("fresh");
        assert_eq!(m.total_calls(), 0);
        assert_eq!(m.retry_attempts_per_call(), Err(MetricsError::DivisionUndefined));
        assert_eq!(
            m.ratio_of_successful_calls_without_retry(),
            Err(MetricsError::DivisionUndefined)
        );
        assert_eq!(
            m.ratio_of_successful_calls_with_retry(),
            Err(MetricsError::DivisionUndefined)
        );
        assert_eq!(
            m.ratio_of_failed_calls_without_retry(),
            Err(MetricsError::DivisionUndefined)
        );
        assert_eq!(
            m.ratio_of_failed_calls_with_retry(),
            Err(MetricsError::DivisionUndefined)
        );
    }

    #[test]
    fn record_classifies_by_attempts_and_outcome() {
        let m = RetryMetrics::new("classify");
        m.record(1, true);
        m.record(3, true);
        m.record(1, false);
        m.record(4, false);

        let s = m.snapshot();
        assert_eq!(s.total_calls, 4);
        assert_eq!(s.total_retry_attempts, 5);
        assert_eq!(s.successful_calls_without_retry, 1);
        assert_eq!(s.successful_calls_with_retry, 1);
        assert_eq!(s.failed_calls_without_retry, 1);
        assert_eq!(s.failed_calls_with_retry, 1);
        assert!(s.is_consistent());
        assert_eq!(s.ratio_of_failed_calls_with_retry(), Ok(0.25));
        assert_eq!(s.retry_attempts_per_call(), Ok(1.25));
    }

    #[test]
    fn reset_zeroes_counters() {
        let m = RetryMetrics::new("reset");
        m.record(2, true);
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn concurrent_records_stay_consistent() {
        let m = Arc::new(RetryMetrics::new("shared"));
        let readers_ok = Arc::new(std::sync::atomic::AtomicBool::new(true));

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let m = Arc::clone(&m);
                thread::spawn(move || {
                    for j in 0..500u32 {
                        m.record(1 + (i + j) % 3, (i + j) % 2 == 0);
                    }
                })
            })
            .collect();
        let reader = {
            let m = Arc::clone(&m);
            let ok = Arc::clone(&readers_ok);
            thread::spawn(move || {
                for _ in 0..2_000 {
                    if !m.snapshot().is_consistent() {
                        ok.store(false, std::sync::atomic::Ordering::SeqCst);
                    }
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();

        assert!(readers_ok.load(std::sync::atomic::Ordering::SeqCst));
        let s = m.snapshot();
        assert_eq!(s.total_calls, 8 * 500);
        assert!(s.is_consistent());
    }

    #[test]
    fn registry_reuses_named_metrics() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_empty());

        let a = registry.get_or_create("get_block");
        let b = registry.get_or_create("get_block");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "get_block");

        registry.get_or_create("get_logs");
        assert_eq!(registry.names(), vec!["get_block", "get_logs"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn registry_clear_resets_in_place() {
        let registry = MetricsRegistry::new();
        let held = registry.get_or_create("send_tx");
        held.record(2, false);

        registry.clear();
        assert_eq!(held.total_calls(), 0);

        held.record(1, true);
        let all = registry.snapshot_all();
        assert_eq!(all["send_tx"].successful_calls_without_retry, 1);

        assert!(registry.remove("send_tx").is_some());
        assert!(registry.is_empty());
    }
}
