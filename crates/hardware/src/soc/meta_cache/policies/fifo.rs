//! First-In, First-Out (FIFO) Replacement Policy.
//!
//! Evicts ways in round-robin order regardless of hits. The pointer advances only when
//! the way it names is filled, so fills proceed in arrival order.
//!
//! # Performance
//!
//! - **Time Complexity:** `update()` O(1), `get_victim()` O(1)
//! - **Space Complexity:** O(S) where S is the number of sets

use super::ReplacementPolicy;

/// FIFO Policy state.
#[derive(Debug)]
pub struct FifoPolicy {
    /// Next way to be evicted for each set.
    next_way: Vec<usize>,
    /// Number of ways in the cache.
    ways: usize,
}

impl FifoPolicy {
    /// Creates a new FIFO policy instance.
    ///
    /// # Arguments
    ///
    /// * `sets` - The number of sets in the cache.
    /// * `ways` - The associativity (number of ways) of the cache.
    pub fn new(sets: usize, ways: usize) -> Self {
        Self {
            next_way: vec![0; sets],
            ways: ways.max(1),
        }
    }
}

impl ReplacementPolicy for FifoPolicy {
    fn update(&mut self, set: usize, way: usize) {
        if self.next_way[set] == way {
            self.next_way[set] = (way + 1) % self.ways;
        }
    }

    fn get_victim(&mut self, set: usize) -> usize {
        self.next_way[set]
    }
}
