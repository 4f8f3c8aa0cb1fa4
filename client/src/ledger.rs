//! Retransmission ledger
//!
//! Commands that have not been answered yet, oldest first. An entry leaves
//! the ledger as soon as its ack or response arrives. When the server has
//! been silent for the resend window, the oldest entry is sent again and
//! moved to the back, so repeated silence cycles through outstanding
//! commands one per window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unacknowledged {
    pub sequence: u8,
    pub text: String,
}

#[derive(Debug)]
pub struct RetransmissionLedger {
    entries: VecDeque<Unacknowledged>,
    resend_after: Duration,
    last_resend: Option<Instant>,
}

impl RetransmissionLedger {
    pub fn new(resend_after: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            resend_after,
            last_resend: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a sent command. An older entry with the same sequence number
    /// belongs to a command the counter has wrapped past and is dropped.
    pub fn push(&mut self, sequence: u8, text: impl Into<String>) {
        self.remove(sequence);
        self.entries.push_back(Unacknowledged {
            sequence,
            text: text.into(),
        });
    }

    pub fn remove(&mut self, sequence: u8) -> bool {
        match self.entries.iter().position(|entry| entry.sequence == sequence) {
            Some(position) => {
                self.entries.remove(position);
                true
            }
            None => false,
        }
    }

    /// Moves the oldest entry to the back and returns a copy to re-send.
    pub fn requeue_oldest(&mut self) -> Option<Unacknowledged> {
        let entry = self.entries.pop_front()?;
        self.entries.push_back(entry.clone());
        Some(entry)
    }

    /// Returns the command to re-send, if the server has been silent for the
    /// resend window and nothing was re-sent within the current window.
    pub fn due_for_resend(&mut self, now: Instant, silence: Duration) -> Option<Unacknowledged> {
        if self.entries.is_empty() || silence < self.resend_after {
            return None;
        }

        if let Some(last) = self.last_resend {
            if now.duration_since(last) < self.resend_after {
                return None;
            }
        }

        self.last_resend = Some(now);
        self.requeue_oldest()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_resend = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(5);

    #[test]
    fn test_insertion_order_is_kept() {
        let mut ledger = RetransmissionLedger::new(WINDOW);
        ledger.push(1, "players");
        ledger.push(2, "bans");

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.requeue_oldest().unwrap().sequence, 1);
    }

    #[test]
    fn test_remove_on_ack() {
        let mut ledger = RetransmissionLedger::new(WINDOW);
        ledger.push(1, "players");
        ledger.push(2, "bans");

        assert!(ledger.remove(1));
        assert!(!ledger.remove(1));
        assert_eq!(ledger.requeue_oldest().unwrap().text, "bans");
    }

    #[test]
    fn test_requeue_cycles_oldest_first() {
        let mut ledger = RetransmissionLedger::new(WINDOW);
        ledger.push(1, "a");
        ledger.push(2, "b");

        assert_eq!(ledger.requeue_oldest().unwrap().sequence, 1);
        assert_eq!(ledger.requeue_oldest().unwrap().sequence, 2);
        assert_eq!(ledger.requeue_oldest().unwrap().sequence, 1);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_wrapped_sequence_replaces_stale_entry() {
        let mut ledger = RetransmissionLedger::new(WINDOW);
        ledger.push(0, "old");
        ledger.push(1, "other");
        ledger.push(0, "new");

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.requeue_oldest().unwrap().text, "other");
    }

    #[test]
    fn test_no_resend_before_silence_window() {
        let mut ledger = RetransmissionLedger::new(WINDOW);
        ledger.push(1, "players");

        let now = Instant::now();
        assert!(ledger.due_for_resend(now, Duration::from_secs(4)).is_none());
        assert!(ledger.due_for_resend(now, WINDOW).is_some());
    }

    #[test]
    fn test_resend_once_per_silence_window() {
        let mut ledger = RetransmissionLedger::new(WINDOW);
        ledger.push(7, "players");

        let start = Instant::now();
        let first = ledger.due_for_resend(start, WINDOW).unwrap();
        assert_eq!(first, Unacknowledged { sequence: 7, text: "players".to_string() });

        // Later ticks inside the same window stay quiet
        for ms in [500, 1_000, 4_500] {
            let now = start + Duration::from_millis(ms);
            assert!(ledger.due_for_resend(now, WINDOW + Duration::from_millis(ms)).is_none());
        }

        let next = start + WINDOW;
        assert_eq!(ledger.due_for_resend(next, WINDOW * 2).unwrap().sequence, 7);
    }

    #[test]
    fn test_empty_ledger_never_resends() {
        let mut ledger = RetransmissionLedger::new(WINDOW);
        assert!(ledger
            .due_for_resend(Instant::now(), Duration::from_secs(60))
            .is_none());
    }

    #[test]
    fn test_clear_resets_state() {
        let mut ledger = RetransmissionLedger::new(WINDOW);
        ledger.push(1, "a");
        ledger.due_for_resend(Instant::now(), WINDOW);
        ledger.clear();

        assert!(ledger.is_empty());
        ledger.push(2, "b");
        assert!(ledger.due_for_resend(Instant::now(), WINDOW).is_some());
    }
}
