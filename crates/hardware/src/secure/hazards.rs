//! Per-block request ordering.
//!
//! Every accepted request is registered against its data block in acceptance order.
//! A request may start its metadata fetch only when no earlier write to the same block
//! is still registered. Reads never hold back a later request from starting; a write
//! behind them is instead held at commit until `reads_before` drops to zero.
//! The entry is retired when the request's response leaves its sub-controller.

use std::collections::{HashMap, VecDeque};

use crate::common::{Direction, RequestId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Entry {
    id: RequestId,
    direction: Direction,
}

const fn blocks_start(earlier: Direction) -> bool {
    matches!(earlier, Direction::Write)
}

/// Ordered per-block lists of in-flight requests.
#[derive(Debug, Default)]
pub struct HazardTracker {
    blocks: HashMap<u64, VecDeque<Entry>>,
}

impl HazardTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a newly accepted request to its block's list.
    pub fn register(&mut self, block: u64, id: RequestId, direction: Direction) {
        self.blocks
            .entry(block)
            .or_default()
            .push_back(Entry { id, direction });
    }

    /// Returns `true` if no earlier write to the block is still registered.
    ///
    /// Unregistered ids are never held back.
    pub fn may_start(&self, block: u64, id: RequestId) -> bool {
        let Some(list) = self.blocks.get(&block) else {
            return true;
        };
        list.iter()
            .take_while(|e| e.id != id)
            .all(|e| !blocks_start(e.direction))
    }

    /// Number of reads registered before `id` on the same block.
    pub fn reads_before(&self, block: u64, id: RequestId) -> usize {
        self.blocks.get(&block).map_or(0, |list| {
            list.iter()
                .take_while(|e| e.id != id)
                .filter(|e| e.direction == Direction::Read)
                .count()
        })
    }

    /// Removes `id` from its block's list.
    pub fn retire(&mut self, block: u64, id: RequestId) {
        if let Some(list) = self.blocks.get_mut(&block) {
            list.retain(|e| e.id != id);
            if list.is_empty() {
                let _ = self.blocks.remove(&block);
            }
        }
    }

    /// Number of requests registered on `block`.
    pub fn in_flight(&self, block: u64) -> usize {
        self.blocks.get(&block).map_or(0, VecDeque::len)
    }

    /// Total registered requests over all blocks.
    pub fn len(&self) -> usize {
        self.blocks.values().map(VecDeque::len).sum()
    }

    /// Returns `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
