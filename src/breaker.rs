//! Circuit breaker shared by the worker pool
//!
//! Two logical states. Closed: requests pass. Open: requests are rejected
//! until the reset timeout has elapsed since the last failure, at which
//! point the next `allow_request` performs a trial admission that eagerly
//! resets the failure count. The whole `(failures, open, last_failure)`
//! triple sits behind one mutex so readers never observe a torn pair.

use crate::config::BreakerSection;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug)]
struct BreakerState {
    failures: u32,
    open: bool,
    last_failure: Option<Instant>,
}

pub struct CircuitBreaker {
    threshold: u32,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            threshold,
            reset_timeout,
            state: Mutex::new(BreakerState {
                failures: 0,
                open: false,
                last_failure: None,
            }),
        }
    }

    pub fn from_config(config: &BreakerSection) -> Self {
        Self::new(config.failure_threshold, config.reset_timeout())
    }

    /// Whether new work may be attempted against the backend right now.
    pub fn allow_request(&self) -> bool {
        let mut state = self.lock();
        if !state.open {
            return true;
        }
        let elapsed_past_reset = state
            .last_failure
            .is_some_and(|t| t.elapsed() > self.reset_timeout);
        if elapsed_past_reset {
            info!("circuit breaker reset timeout elapsed, admitting trial request");
            state.open = false;
            state.failures = 0;
            return true;
        }
        false
    }

    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.last_failure = Some(Instant::now());
        state.failures += 1;
        if state.failures >= self.threshold && !state.open {
            warn!(
                failures = state.failures,
                threshold = self.threshold,
                "circuit breaker opened"
            );
            state.open = true;
            crate::observability::metrics::metrics().record_breaker_open();
        }
    }

    /// Idempotent: an already-closed breaker just keeps its count at 0.
    pub fn record_success(&self) {
        let mut state = self.lock();
        if state.open {
            info!("circuit breaker closed after successful request");
        }
        state.failures = 0;
        state.open = false;
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
