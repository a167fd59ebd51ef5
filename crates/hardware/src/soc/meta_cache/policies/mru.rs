//! Most Recently Used (MRU) Replacement Policy.
//!
//! Evicts the way touched last. Useful as a contrast to LRU when a walk streams through
//! more leaf metadata than the cache holds: the line just filled is the one least
//! likely to be needed again soon, while upper tree levels stay resident.

use super::ReplacementPolicy;

/// MRU Policy state.
#[derive(Debug)]
pub struct MruPolicy {
    /// One recency stack per set. Index 0 is the victim.
    usage: Vec<Vec<usize>>,
}

impl MruPolicy {
    /// Creates a new MRU policy instance.
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
}

impl ReplacementPolicy for MruPolicy {
    fn update(&mut self, set: usize, way: usize) {
        let stack = &mut self.usage[set];
        stack.retain(|&x| x != way);
        stack.insert(0, way);
    }

    fn get_victim(&mut self, set: usize) -> usize {
        self.usage[set].first().copied().unwrap_or(0)
    }

    fn invalidate(&mut self, set: usize, way: usize) {
        let stack = &mut self.usage[set];
        stack.retain(|&x| x != way);
        stack.insert(0, way);
    }
}
