//! Process-wide counters for the dispatch pipeline
//!
//! Lock-free atomics behind a single global accessor; a snapshot is exported
//! as JSON on `GET /metrics`. Counters only, no histograms: latency analysis
//! belongs to the backend's own telemetry.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Global metrics accessor
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    requests_total: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_rejected: AtomicU64,
    rate_limited: AtomicU64,
    validation_failures: AtomicU64,
    broker_failures: AtomicU64,
    retries: AtomicU64,
    breaker_opens: AtomicU64,
}

/// Point-in-time view of all counters
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_succeeded: u64,
    pub requests_rejected: u64,
    pub rate_limited: u64,
    pub validation_failures: u64,
    pub broker_failures: u64,
    pub retries: u64,
    pub breaker_opens: u64,
}

impl MetricsCollector {
    fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
        self.record_rejected();
    }

    pub fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
        self.record_rejected();
    }

    pub fn record_broker_failure(&self) {
        self.broker_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_breaker_open(&self) {
        self.breaker_opens.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            broker_failures: self.broker_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            breaker_opens: self.breaker_opens.load(Ordering::Relaxed),
        }
    }
}
