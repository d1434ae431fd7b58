//! Per-host politeness shared by all fetch workers

use crate::state::HostState;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Enforces a minimum delay between two requests to the same host
pub struct HostLimiter {
    delay: Duration,
    hosts: Mutex<HashMap<String, HostState>>,
}

impl HostLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Waits until a request to `host` may start
    ///
    /// The slot is reserved before sleeping, so workers targeting the same
    /// host are spaced one delay apart.
    pub async fn wait_turn(&self, host: &str) {
        if self.delay.is_zero() {
            return;
        }

        let wait = {
            let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
            hosts
                .entry(host.to_string())
                .or_insert_with(HostState::new)
                .reserve(self.delay, Instant::now())
        };

        if !wait.is_zero() {
            tracing::trace!("Waiting {:?} before next request to {}", wait, host);
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of requests started against `host`
    pub fn request_count(&self, host: &str) -> u64 {
        let hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts.get(host).map(|s| s.request_count).unwrap_or(0)
    }
}
