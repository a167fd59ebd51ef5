//! Least Recently Used (LRU) Replacement Policy.
//!
//! Keeps a recency stack per set: index 0 is the most recently used way and the last
//! entry is the victim. Invalidated ways are moved to the bottom so they are refilled
//! before any live line is displaced.
//!
//! # Performance
//!
//! - **Time Complexity:**
//!   - `update()`: O(W) where W is the number of ways (associativity)
//!   - `get_victim()`: O(1)
//! - **Space Complexity:** O(S × W) where S is the number of sets

use super::ReplacementPolicy;

/// LRU Policy state.
#[derive(Debug)]
pub struct LruPolicy {
    /// One recency stack per set. Index 0 is MRU, last index is LRU.
    usage: Vec<Vec<usize>>,
}

impl LruPolicy {
    /// Creates a new LRU policy instance.
    ///
    /// # Arguments
    ///
    /// * `sets` - The number of sets in the cache.
    /// * `ways` - The associativity (number of ways) of the cache.
    pub fn new(sets: usize, ways: usize) -> Self {
        Self {
            usage: (0..sets).map(|_| (0..ways).collect()).collect(),
        }
    }

    fn unlink(stack: &mut Vec<usize>, way: usize) {
        if let Some(pos) = stack.iter().position(|&x| x == way) {
            let _ = stack.remove(pos);
        }
    }
}

impl ReplacementPolicy for LruPolicy {
    fn update(&mut self, set: usize, way: usize) {
        let stack = &mut self.usage[set];
        Self::unlink(stack, way);
        stack.insert(0, way);
    }

    fn get_victim(&mut self, set: usize) -> usize {
        self.usage[set].last().copied().unwrap_or(0)
    }

    fn invalidate(&mut self, set: usize, way: usize) {
        let stack = &mut self.usage[set];
        Self::unlink(stack, way);
        stack.push(way);
    }
}
