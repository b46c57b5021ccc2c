//! Per-client sliding-window rate limiter
//!
//! Admission is decided before any work is queued: prune a client's
//! timestamps to the trailing window, deny without recording when the cap is
//! reached, otherwise record now and allow. The client map is bounded; when
//! it grows past `max_clients`, entries whose whole window has expired are
//! evicted, falling back to the stalest live client only if that pruning
//! freed no space.

use crate::config::RateLimitSection;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    max_clients: usize,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration, max_clients: usize) -> Self {
        Self {
            max_requests,
            window,
            max_clients,
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitSection) -> Self {
        Self::new(config.max_requests, config.window(), config.max_clients)
    }

    /// Returns true when the client is admitted. A denied request is not
    /// recorded, so it does not extend the client's window.
    pub fn check(&self, client_id: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());

        if !requests.contains_key(client_id) && requests.len() >= self.max_clients {
            Self::evict(&mut requests, self.window, self.max_clients, now);
        }

        let timestamps = requests.entry(client_id.to_string()).or_default();
        while let Some(&oldest) = timestamps.front() {
            if now.duration_since(oldest) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.max_requests {
            debug!(client_id, count = timestamps.len(), "rate limit exceeded");
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn evict(
        requests: &mut HashMap<String, VecDeque<Instant>>,
        window: Duration,
        max_clients: usize,
        now: Instant,
    ) {
        // Drop every client whose newest timestamp fell out of the window.
        requests.retain(|_, timestamps| {
            timestamps
                .back()
                .is_some_and(|&newest| now.duration_since(newest) <= window)
        });
        if requests.len() < max_clients {
            return;
        }
        // Still full: evict the single stalest client.
        if let Some(stalest) = requests
            .iter()
            .min_by_key(|(_, timestamps)| timestamps.back().copied())
            .map(|(id, _)| id.clone())
        {
            requests.remove(&stalest);
        }
    }
}
