//! Server silence tracking
//!
//! Silence only counts while we are waiting for the server: from the first
//! datagram sent after the last one received, or from the last received
//! datagram if commands were still unanswered at that point. An idle link
//! with nothing outstanding is never declared lost; the keep-alive probe
//! takes care of it.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct LivenessMonitor {
    lost_after: Duration,
    awaiting_since: Option<Instant>,
    last_received: Instant,
}

impl LivenessMonitor {
    pub fn new(lost_after: Duration, now: Instant) -> Self {
        Self {
            lost_after,
            awaiting_since: None,
            last_received: now,
        }
    }

    pub fn on_sent(&mut self, now: Instant) {
        self.awaiting_since.get_or_insert(now);
    }

    /// Any valid datagram from the server. `outstanding` tells whether
    /// commands are still waiting for an answer afterwards.
    pub fn on_received(&mut self, now: Instant, outstanding: bool) {
        self.last_received = now;
        self.awaiting_since = outstanding.then_some(now);
    }

    pub fn last_received(&self) -> Instant {
        self.last_received
    }

    pub fn silence(&self, now: Instant) -> Duration {
        self.awaiting_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_lost(&self, now: Instant) -> bool {
        self.silence(now) >= self.lost_after
    }
}
