//! Timed completion queue.
//!
//! Components that model latency schedule an item for a future cycle and drain
//! whatever has become due at the start of each cycle. Items due on the same cycle
//! come out in the order they were scheduled, which keeps runs deterministic.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::common::Cycle;

#[derive(Debug)]
struct Scheduled<T> {
    ready: Cycle,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Scheduled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ready == other.ready && self.seq == other.seq
    }
}

impl<T> Eq for Scheduled<T> {}

impl<T> PartialOrd for Scheduled<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Scheduled<T> {
    // Reversed: BinaryHeap is a max-heap and the earliest entry must surface first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .ready
            .cmp(&self.ready)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of items keyed by the cycle they become ready.
#[derive(Debug)]
pub struct TimedQueue<T> {
    heap: BinaryHeap<Scheduled<T>>,
    next_seq: u64,
}

impl<T> Default for TimedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimedQueue<T> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedules `item` to become ready at cycle `ready`.
    pub fn schedule(&mut self, ready: Cycle, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled { ready, seq, item });
    }

    /// Removes and returns the earliest item that is ready at `now`.
    pub fn pop_due(&mut self, now: Cycle) -> Option<T> {
        if self.heap.peek().is_some_and(|s| s.ready <= now) {
            self.heap.pop().map(|s| s.item)
        } else {
            None
        }
    }

    /// Cycle at which the earliest item becomes ready.
    pub fn next_ready(&self) -> Option<Cycle> {
        self.heap.peek().map(|s| s.ready)
    }

    /// Number of scheduled items.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns `true` if nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
