//! Pending-command registry
//!
//! Every command sent to the server gets an entry keyed by its sequence
//! number. The receive cycle resolves entries when an ack, a single-packet
//! response or the last fragment of a multi-part response arrives; the
//! polling tick sweeps out entries whose expiry passed without an answer.
//!
//! Resolution is at-most-once: an entry is removed from the map before its
//! waiter or handler runs, so a late duplicate response finds nothing.

use crate::assembler::{AssemblyError, MultiPartAssembly};
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Body reported for a bare acknowledgement.
pub const ACK_BODY: &str = "OK";

/// One-shot callback run when the response arrives, before the general
/// response event is published.
pub type ResponseHandler = Box<dyn FnOnce(&CommandResponse) + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub sequence: u8,
    /// Command text as it was sent
    pub command: String,
    pub body: String,
    /// The server only acknowledged the command; `body` is [`ACK_BODY`]
    pub acknowledged_only: bool,
}

pub struct PendingCommand {
    sequence: u8,
    command: String,
    submitted_at: Instant,
    expires_at: Instant,
    assembly: Option<MultiPartAssembly>,
    waiter: Option<oneshot::Sender<CommandResponse>>,
    handler: Option<ResponseHandler>,
}

impl PendingCommand {
    pub fn new(sequence: u8, command: impl Into<String>, now: Instant, timeout: Duration) -> Self {
        Self {
            sequence,
            command: command.into(),
            submitted_at: now,
            expires_at: now + timeout,
            assembly: None,
            waiter: None,
            handler: None,
        }
    }

    pub fn with_waiter(mut self, waiter: oneshot::Sender<CommandResponse>) -> Self {
        self.waiter = Some(waiter);
        self
    }

    pub fn with_handler(mut self, handler: ResponseHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Consumes the entry and delivers the response: handler first, then the
    /// awaiting caller. `None` means a bare acknowledgement.
    pub fn complete(mut self, body: Option<String>) -> CommandResponse {
        let response = CommandResponse {
            sequence: self.sequence,
            command: std::mem::take(&mut self.command),
            acknowledged_only: body.is_none(),
            body: body.unwrap_or_else(|| ACK_BODY.to_string()),
        };

        if let Some(handler) = self.handler.take() {
            handler(&response);
        }
        if let Some(waiter) = self.waiter.take() {
            // The caller may have dropped its handle; that is fine
            let _ = waiter.send(response.clone());
        }

        response
    }
}

impl fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCommand")
            .field("sequence", &self.sequence)
            .field("command", &self.command)
            .field("expires_at", &self.expires_at)
            .field("assembly", &self.assembly)
            .field("has_waiter", &self.waiter.is_some())
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// Stored; more parts are still missing
    Pending { received: usize, total: u8 },
    /// Every part arrived; the concatenated body in index order
    Complete(String),
    /// No command is waiting on this sequence number
    Unknown,
    /// The fragment contradicted the assembly, which was thrown away
    Discarded(AssemblyError),
}

#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: HashMap<u8, PendingCommand>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, sequence: u8) -> bool {
        self.entries.contains_key(&sequence)
    }

    /// Adds an entry. A stale entry still holding the same sequence number
    /// (the counter wrapped past it) is displaced and returned.
    pub fn register(&mut self, entry: PendingCommand) -> Option<PendingCommand> {
        let displaced = self.entries.insert(entry.sequence, entry);
        if let Some(old) = &displaced {
            warn!(
                "Sequence {} reused while command {:?} was still pending",
                old.sequence, old.command
            );
        }
        displaced
    }

    /// Removes the entry so the caller can complete it outside the lock.
    pub fn take(&mut self, sequence: u8) -> Option<PendingCommand> {
        self.entries.remove(&sequence)
    }

    pub fn accept_fragment(
        &mut self,
        sequence: u8,
        index: u8,
        total: u8,
        fragment: Vec<u8>,
    ) -> FragmentOutcome {
        let Some(entry) = self.entries.get_mut(&sequence) else {
            return FragmentOutcome::Unknown;
        };

        let assembly = entry
            .assembly
            .get_or_insert_with(|| MultiPartAssembly::new(total));

        if let Err(error) = assembly.insert(index, total, fragment) {
            entry.assembly = None;
            return FragmentOutcome::Discarded(error);
        }

        if !assembly.is_complete() {
            return FragmentOutcome::Pending {
                received: assembly.received(),
                total,
            };
        }

        match entry.assembly.take().map(MultiPartAssembly::finish) {
            Some(Ok(bytes)) => FragmentOutcome::Complete(String::from_utf8_lossy(&bytes).into_owned()),
            Some(Err(assembly)) => {
                let received = assembly.received();
                entry.assembly = Some(assembly);
                FragmentOutcome::Pending { received, total }
            }
            None => FragmentOutcome::Unknown,
        }
    }

    /// Removes every entry whose expiry has passed. Dropping the returned
    /// entries releases their waiters with "no response".
    pub fn sweep_expired(&mut self, now: Instant) -> Vec<PendingCommand> {
        let expired: Vec<u8> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.sequence)
            .collect();

        let removed: Vec<PendingCommand> = expired
            .into_iter()
            .filter_map(|sequence| self.entries.remove(&sequence))
            .collect();

        for entry in &removed {
            debug!(
                "Command {} ({:?}) expired after {:?} without a response",
                entry.sequence,
                entry.command,
                now.duration_since(entry.submitted_at)
            );
        }

        removed
    }

    /// Empties the registry, e.g. when the link goes down.
    pub fn drain(&mut self) -> Vec<PendingCommand> {
        self.entries.drain().map(|(_, entry)| entry).collect()
    }
}
