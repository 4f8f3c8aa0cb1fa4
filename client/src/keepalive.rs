//! Keep-alive probing
//!
//! The server drops sessions that stay quiet too long. When no command has
//! gone out for the keep-alive interval, the supervisor asks for an empty
//! command to be sent. While a probe is unanswered the next one follows after
//! the shorter retry interval. After `max_unanswered` probes in a row go
//! unanswered the link is dead.
//!
//! Probes do not feed the liveness monitor, so on an idle link this counter
//! alone decides when the server is gone.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveAction {
    Idle,
    SendProbe,
    LinkDead { unanswered: u32 },
}

#[derive(Debug)]
pub struct KeepAliveSupervisor {
    interval: Duration,
    retry_after: Duration,
    max_unanswered: u32,
    last_sent: Instant,
    unanswered: u32,
    /// Sequence numbers of probes still waiting for their ack
    probes: Vec<u8>,
}

impl KeepAliveSupervisor {
    pub fn new(interval: Duration, retry_after: Duration, max_unanswered: u32, now: Instant) -> Self {
        Self {
            interval,
            retry_after: retry_after.min(interval),
            max_unanswered,
            last_sent: now,
            unanswered: 0,
            probes: Vec::new(),
        }
    }

    pub fn unanswered(&self) -> u32 {
        self.unanswered
    }

    pub fn has_outstanding_probe(&self) -> bool {
        !self.probes.is_empty()
    }

    /// Application traffic resets the quiet interval.
    pub fn note_command_sent(&mut self, now: Instant) {
        self.last_sent = now;
    }

    pub fn poll(&self, now: Instant) -> KeepAliveAction {
        let wait = if self.has_outstanding_probe() {
            self.retry_after
        } else {
            self.interval
        };
        if now.saturating_duration_since(self.last_sent) < wait {
            return KeepAliveAction::Idle;
        }

        if self.unanswered >= self.max_unanswered {
            KeepAliveAction::LinkDead {
                unanswered: self.unanswered,
            }
        } else {
            KeepAliveAction::SendProbe
        }
    }

    pub fn probe_sent(&mut self, sequence: u8, now: Instant) {
        self.probes.retain(|&probe| probe != sequence);
        self.probes.push(sequence);
        self.unanswered += 1;
        self.last_sent = now;
    }

    /// Called for every command ack; returns whether it answered a probe.
    pub fn acknowledge(&mut self, sequence: u8) -> bool {
        if !self.probes.contains(&sequence) {
            return false;
        }

        self.probes.clear();
        self.unanswered = 0;
        true
    }
}
