//! Rolling window of outstanding sequence numbers for one sender session.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

/// When an outstanding packet left the sender.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sent {
    pub at: Instant,
    /// Wall-clock counterpart of `at`, matching the on-wire timestamp.
    pub wall_ts: f64,
}

/// What one feedback datagram meant to the window.
#[derive(Debug, PartialEq)]
pub enum Feedback {
    /// First feedback for an outstanding packet.
    Retired { sent: Sent },
    /// A sequence number this session already settled (duplicate, or one
    /// that was written off as lost).
    Stale,
    /// A sequence number this session never emitted, e.g. leftovers from a
    /// prior episode on a reused path.
    Foreign,
}

/// Tracks which packets are in flight.
///
/// Sequence numbers are strictly increasing and never reused within a
/// session; feedback handling is idempotent, so duplicates and foreign
/// numbers never change the window.
#[derive(Debug, Default)]
pub struct Window {
    next_seq: u64,
    outstanding: BTreeMap<u64, Sent>,
}

impl Window {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.outstanding.len()
    }

    /// Registers the next packet as sent and returns its sequence number.
    pub fn mark_sent(&mut self, at: Instant, wall_ts: f64) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.outstanding.insert(seq, Sent { at, wall_ts });
        seq
    }

    /// Settles the fate of one feedback datagram.
    pub fn on_feedback(&mut self, seq: u64) -> Feedback {
        match self.outstanding.remove(&seq) {
            Some(sent) => Feedback::Retired { sent },
            None if seq < self.next_seq => Feedback::Stale,
            None => Feedback::Foreign,
        }
    }

    /// Writes off every packet older than `timeout`, returning how many.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> usize {
        // Send times are monotonic in sequence order, so the overdue
        // packets form a prefix.
        let expired: Vec<u64> = self
            .outstanding
            .iter()
            .take_while(|(_, sent)| now.duration_since(sent.at) >= timeout)
            .map(|(&seq, _)| seq)
            .collect();

        for seq in &expired {
            self.outstanding.remove(seq);
        }

        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent_now() -> (Instant, f64) {
        (Instant::now(), 0.0)
    }

    #[test]
    fn sequence_numbers_strictly_increase() {
        let mut window = Window::new();
        let (at, wall) = sent_now();

        let seqs: Vec<u64> = (0..100).map(|_| window.mark_sent(at, wall)).collect();

        for pair in seqs.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        assert_eq!(window.in_flight(), 100);
    }

    #[test]
    fn feedback_retires_exactly_once() {
        let mut window = Window::new();
        let (at, wall) = sent_now();
        let seq = window.mark_sent(at, wall);

        assert!(matches!(window.on_feedback(seq), Feedback::Retired { .. }));
        assert_eq!(window.in_flight(), 0);

        // The duplicate is an idempotent ignore.
        assert_eq!(window.on_feedback(seq), Feedback::Stale);
        assert_eq!(window.in_flight(), 0);
    }

    #[test]
    fn foreign_sequence_numbers_are_ignored() {
        let mut window = Window::new();
        let (at, wall) = sent_now();
        window.mark_sent(at, wall);

        assert_eq!(window.on_feedback(7), Feedback::Foreign);
        assert_eq!(window.in_flight(), 1);
    }

    #[test]
    fn expire_writes_off_only_overdue_packets() {
        let mut window = Window::new();
        let timeout = Duration::from_millis(100);
        let old = Instant::now();
        let fresh = old + Duration::from_millis(80);
        let now = old + Duration::from_millis(120);

        window.mark_sent(old, 0.0);
        window.mark_sent(old, 0.0);
        let kept = window.mark_sent(fresh, 0.0);

        assert_eq!(window.expire(now, timeout), 2);
        assert_eq!(window.in_flight(), 1);
        assert!(matches!(window.on_feedback(kept), Feedback::Retired { .. }));
    }

    #[test]
    fn expired_packets_feed_back_as_stale() {
        let mut window = Window::new();
        let at = Instant::now();
        let seq = window.mark_sent(at, 0.0);

        window.expire(at + Duration::from_secs(1), Duration::from_millis(10));
        assert_eq!(window.on_feedback(seq), Feedback::Stale);
    }
}
