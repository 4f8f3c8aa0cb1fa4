//! Client tuning knobs
//!
//! Defaults reproduce the timing a BattlEye-style server expects: a 500 ms
//! polling tick, a resend after 5 s of server silence, link loss after 20 s
//! and a keep-alive probe after 25 s without outbound commands. Every field
//! can be overridden from a JSON file; missing fields keep their defaults.

use crate::error::{RconError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How long `connect` waits for the login response
    pub login_timeout_ms: u64,
    /// Default expiry of a pending command
    pub command_timeout_ms: u64,
    /// Period of the expiry sweep, retransmission and keep-alive checks
    pub poll_interval_ms: u64,
    /// Server silence after which the oldest unacknowledged command is re-sent
    pub resend_after_ms: u64,
    /// Server silence after which the link is declared lost
    pub connection_lost_after_ms: u64,
    /// Quiet period without outbound commands before a keep-alive probe.
    /// An unanswered probe is retried after `resend_after_ms`.
    pub keep_alive_interval_ms: u64,
    /// Consecutive unanswered probes after which an idle link is dead
    pub max_unanswered_probes: u32,
    /// Number of console-message sequence numbers remembered for deduplication
    pub duplicate_window: usize,
    /// Reconnect with the same credentials instead of terminating on loss
    pub reconnect_on_packet_loss: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            login_timeout_ms: 5_000,
            command_timeout_ms: 10_000,
            poll_interval_ms: 500,
            resend_after_ms: 5_000,
            connection_lost_after_ms: 20_000,
            keep_alive_interval_ms: 25_000,
            max_unanswered_probes: 3,
            duplicate_window: 100,
            reconnect_on_packet_loss: false,
            max_reconnect_attempts: 3,
            reconnect_delay_ms: 1_000,
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ClientConfig =
            serde_json::from_str(json).map_err(|e| RconError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| RconError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Rejects settings that would stall the polling loop or make every
    /// command expire immediately.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(RconError::Config("poll_interval_ms must be positive".into()));
        }
        if self.command_timeout_ms == 0 || self.login_timeout_ms == 0 {
            return Err(RconError::Config("timeouts must be positive".into()));
        }
        if self.duplicate_window == 0 {
            return Err(RconError::Config("duplicate_window must be positive".into()));
        }
        if self.resend_after_ms >= self.connection_lost_after_ms {
            return Err(RconError::Config(
                "resend_after_ms must be shorter than connection_lost_after_ms".into(),
            ));
        }
        if self.poll_interval_ms > self.resend_after_ms {
            return Err(RconError::Config(
                "poll_interval_ms must not exceed resend_after_ms".into(),
            ));
        }
        // An idle link is only declared dead by counting unanswered probes
        if self.max_unanswered_probes == 0 {
            return Err(RconError::Config("max_unanswered_probes must be positive".into()));
        }
        if self.keep_alive_interval_ms < self.poll_interval_ms {
            return Err(RconError::Config(
                "keep_alive_interval_ms must not be shorter than poll_interval_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn resend_after(&self) -> Duration {
        Duration::from_millis(self.resend_after_ms)
    }

    pub fn connection_lost_after(&self) -> Duration {
        Duration::from_millis(self.connection_lost_after_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
