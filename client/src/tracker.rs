//! Duplicate detection for console messages
//!
//! The server re-sends a console message until it sees our acknowledgement,
//! so the same sequence number can arrive several times. The tracker keeps
//! the most recent sequence numbers in a fixed ring; an incoming message is
//! delivered only if its number is not in the ring.

#[derive(Debug, Clone)]
pub struct SequenceTracker {
    slots: Vec<Option<u8>>,
    /// Slot overwritten by the next `record`
    next: usize,
}

impl SequenceTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            next: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Stores `sequence`, overwriting the oldest slot once the ring is full.
    pub fn record(&mut self, sequence: u8) {
        self.slots[self.next] = Some(sequence);
        self.next = (self.next + 1) % self.slots.len();
    }

    pub fn contains(&self, sequence: u8) -> bool {
        self.slots.iter().any(|slot| *slot == Some(sequence))
    }

    /// Records `sequence` and reports whether it was new.
    pub fn observe(&mut self, sequence: u8) -> bool {
        if self.contains(sequence) {
            return false;
        }
        self.record(sequence);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tracker_contains_nothing() {
        let tracker = SequenceTracker::new(100);
        assert_eq!(tracker.capacity(), 100);
        assert!(!tracker.contains(0));
        assert!(!tracker.contains(255));
    }

    #[test]
    fn test_record_and_contains() {
        let mut tracker = SequenceTracker::new(4);
        tracker.record(10);
        tracker.record(11);

        assert!(tracker.contains(10));
        assert!(tracker.contains(11));
        assert!(!tracker.contains(12));
    }

    #[test]
    fn test_oldest_slot_is_overwritten() {
        let mut tracker = SequenceTracker::new(3);
        for sequence in [1, 2, 3, 4] {
            tracker.record(sequence);
        }

        assert!(!tracker.contains(1));
        assert!(tracker.contains(2));
        assert!(tracker.contains(4));
    }

    #[test]
    fn test_observe_reports_duplicates() {
        let mut tracker = SequenceTracker::new(100);
        assert!(tracker.observe(42));
        assert!(!tracker.observe(42));
        assert!(tracker.observe(43));
    }

    #[test]
    fn test_wrapped_sequence_is_new_again_after_window() {
        let mut tracker = SequenceTracker::new(100);
        for sequence in 0..=255u8 {
            assert!(tracker.observe(sequence));
        }

        // 0 fell out of the 100-slot window long ago
        assert!(tracker.observe(0));
        assert!(!tracker.observe(255));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut tracker = SequenceTracker::new(0);
        tracker.record(1);
        assert!(tracker.contains(1));
    }
}
