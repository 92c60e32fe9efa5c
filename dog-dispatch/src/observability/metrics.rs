use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

/// Live counters shared by a dispatcher, its executor and any workers built from it
#[derive(Debug, Default)]
pub struct LiveMetrics {
    jobs_enqueued: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_retryable: AtomicU64,
    envelopes_malformed: AtomicU64,
    functions_unknown: AtomicU64,
    broker_errors: AtomicU64,

    // Per-function metrics
    functions: RwLock<HashMap<String, FunctionMetrics>>,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueued(&self, function_name: &str) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
        self.with_function(function_name, |m| m.enqueued += 1);
    }

    pub fn record_completed(&self, function_name: &str, elapsed: Duration) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        self.with_function(function_name, |m| {
            m.completed += 1;
            m.record_duration(elapsed);
        });
    }

    pub fn record_failed(&self, function_name: &str, elapsed: Duration, retryable: bool) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        if retryable {
            self.jobs_retryable.fetch_add(1, Ordering::Relaxed);
        }
        self.with_function(function_name, |m| {
            m.failed += 1;
            m.record_duration(elapsed);
        });
    }

    pub fn record_malformed(&self) {
        self.envelopes_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown(&self, function_name: &str) {
        self.functions_unknown.fetch_add(1, Ordering::Relaxed);
        self.with_function(function_name, |m| m.unknown += 1);
    }

    pub fn record_broker_error(&self) {
        self.broker_errors.fetch_add(1, Ordering::Relaxed);
    }

    // Getters for global metrics
    pub fn jobs_enqueued(&self) -> u64 {
        self.jobs_enqueued.load(Ordering::Relaxed)
    }

    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    pub fn envelopes_malformed(&self) -> u64 {
        self.envelopes_malformed.load(Ordering::Relaxed)
    }

    pub fn functions_unknown(&self) -> u64 {
        self.functions_unknown.load(Ordering::Relaxed)
    }

    pub fn broker_errors(&self) -> u64 {
        self.broker_errors.load(Ordering::Relaxed)
    }

    /// Get metrics for a specific function
    pub fn function(&self, function_name: &str) -> Option<FunctionMetrics> {
        self.functions.read().get(function_name).cloned()
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_enqueued: self.jobs_enqueued(),
            jobs_completed: self.jobs_completed(),
            jobs_failed: self.jobs_failed(),
            jobs_retryable: self.jobs_retryable.load(Ordering::Relaxed),
            envelopes_malformed: self.envelopes_malformed(),
            functions_unknown: self.functions_unknown(),
            broker_errors: self.broker_errors(),
            functions: self
                .functions
                .read()
                .iter()
                .map(|(name, metrics)| (name.clone(), metrics.clone()))
                .collect(),
        }
    }

    fn with_function(&self, function_name: &str, update: impl FnOnce(&mut FunctionMetrics)) {
        let mut functions = self.functions.write();
        match functions.get_mut(function_name) {
            Some(metrics) => update(metrics),
            None => {
                let mut metrics = FunctionMetrics::default();
                update(&mut metrics);
                functions.insert(function_name.to_string(), metrics);
            }
        }
    }
}

/// Counters for a single function name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FunctionMetrics {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub unknown: u64,
    pub total_duration_ms: u64,
    pub max_duration_ms: u64,
}

impl FunctionMetrics {
    fn record_duration(&mut self, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.total_duration_ms = self.total_duration_ms.saturating_add(ms);
        self.max_duration_ms = self.max_duration_ms.max(ms);
    }

    /// Mean run time over completed and failed executions
    pub fn average_duration_ms(&self) -> f64 {
        let runs = self.completed + self.failed;
        if runs == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / runs as f64
        }
    }
}

/// Serializable view of [`LiveMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_enqueued: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_retryable: u64,
    pub envelopes_malformed: u64,
    pub functions_unknown: u64,
    pub broker_errors: u64,
    pub functions: BTreeMap<String, FunctionMetrics>,
}
