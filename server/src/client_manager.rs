//! Logged-in RCon client tracking for the development server
//!
//! This module handles the server-side bookkeeping for every remote console
//! that has logged in:
//! - Session lifecycle (login, re-login from the same address, timeout)
//! - Console message sequence numbering per client
//! - Unacknowledged console messages and their bounded re-delivery
//!
//! Console messages are the only datagrams the server expects to be
//! acknowledged. Anything not acknowledged within the resend interval is
//! delivered again, with the same sequence number, until the client answers
//! or the attempt limit is reached.

use log::{debug, info};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A console message waiting for the client's acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub sequence: u8,
    pub body: String,
    pub sent_at: Instant,
    pub attempts: u32,
}

/// A logged-in remote console
#[derive(Debug)]
pub struct Client {
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any datagram from this client
    pub last_seen: Instant,
    /// Sequence number for the next console message; wraps at 255
    next_message_sequence: u8,
    /// Console messages not yet acknowledged, oldest first
    unacked: Vec<OutboundMessage>,
}

impl Client {
    pub fn new(addr: SocketAddr, now: Instant) -> Self {
        Self {
            addr,
            last_seen: now,
            next_message_sequence: 0,
            unacked: Vec::new(),
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_seen = now;
    }

    /// Checks if the client has exceeded the connection timeout
    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }

    /// Allocates a sequence number for `body` and keeps the message until it
    /// is acknowledged.
    pub fn queue_message(&mut self, body: &str, now: Instant) -> OutboundMessage {
        let sequence = self.next_message_sequence;
        self.next_message_sequence = self.next_message_sequence.wrapping_add(1);

        // A sequence number still unacknowledged after 256 messages is stale
        self.unacked.retain(|message| message.sequence != sequence);

        let message = OutboundMessage {
            sequence,
            body: body.to_string(),
            sent_at: now,
            attempts: 1,
        };
        self.unacked.push(message.clone());
        message
    }

    pub fn acknowledge(&mut self, sequence: u8) -> bool {
        let before = self.unacked.len();
        self.unacked.retain(|message| message.sequence != sequence);
        self.unacked.len() != before
    }

    pub fn unacked_count(&self) -> usize {
        self.unacked.len()
    }

    /// Messages due for another delivery. Messages that already used up
    /// `max_attempts` are dropped instead.
    pub fn due_for_resend(
        &mut self,
        now: Instant,
        resend_after: Duration,
        max_attempts: u32,
    ) -> Vec<OutboundMessage> {
        let addr = self.addr;
        self.unacked.retain(|message| {
            let keep = message.attempts < max_attempts
                || now.saturating_duration_since(message.sent_at) < resend_after;
            if !keep {
                debug!("Giving up on console message {} to {}", message.sequence, addr);
            }
            keep
        });

        let mut due = Vec::new();
        for message in &mut self.unacked {
            if now.saturating_duration_since(message.sent_at) >= resend_after {
                message.sent_at = now;
                message.attempts += 1;
                due.push(message.clone());
            }
        }
        due
    }
}

/// Manages every logged-in client, keyed by address
#[derive(Debug, Default)]
pub struct ClientManager {
    clients: HashMap<SocketAddr, Client>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a successful login. A second login from the same address
    /// replaces the previous session, console sequence numbering included.
    pub fn login(&mut self, addr: SocketAddr, now: Instant) {
        if self.clients.insert(addr, Client::new(addr, now)).is_some() {
            info!("Client {} logged in again, session reset", addr);
        } else {
            info!("Client {} logged in", addr);
        }
    }

    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut Client> {
        self.clients.get_mut(addr)
    }

    pub fn clients_mut(&mut self) -> impl Iterator<Item = &mut Client> {
        self.clients.values_mut()
    }

    /// Drops clients that went silent and returns their addresses
    pub fn check_timeouts(&mut self, now: Instant, timeout: Duration) -> Vec<SocketAddr> {
        let timed_out: Vec<SocketAddr> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(now, timeout))
            .map(|client| client.addr)
            .collect();

        for addr in &timed_out {
            info!("Client {} timed out", addr);
            self.clients.remove(addr);
        }

        timed_out
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
