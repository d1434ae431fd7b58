use std::time::{Duration, Instant};

/// Tracks the politeness state of one host during crawling
///
/// Hosts are identified by authority (host and port), so every port of a
/// machine gets its own slot.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Number of requests started against this host in the current session
    pub request_count: u64,

    /// Time at which the most recent request was allowed to start
    pub last_request_time: Option<Instant>,
}

impl HostState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculates the time until the next request may start
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, delay: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let ready_at = last + delay;
        if ready_at > now {
            Some(ready_at - now)
        } else {
            None
        }
    }

    /// Reserves the next request slot and returns how long the caller must wait
    ///
    /// The slot is reserved immediately, so concurrent callers for the same
    /// host queue up one delay apart instead of all waking at once.
    pub fn reserve(&mut self, delay: Duration, now: Instant) -> Duration {
        let wait = self.time_until_next_request(delay, now).unwrap_or(Duration::ZERO);
        self.last_request_time = Some(now + wait);
        self.request_count += 1;
        wait
    }
}
