//! Random Replacement Policy.
//!
//! Evicts a pseudo-random way using a xorshift generator with a fixed seed, so runs
//! are reproducible.

use super::ReplacementPolicy;

/// Random Policy state.
#[derive(Debug)]
pub struct RandomPolicy {
    /// Number of ways in the cache.
    ways: usize,
    /// xorshift64 state.
    state: u64,
}

impl RandomPolicy {
    /// Creates a new Random policy instance.
    ///
    /// # Arguments
    ///
    /// * `_sets` - Unused; present for a uniform constructor.
    /// * `ways` - The associativity (number of ways) of the cache.
    pub fn new(_sets: usize, ways: usize) -> Self {
        Self::with_seed(ways, 123456789)
    }

    /// Creates a Random policy with an explicit non-zero seed.
    pub fn with_seed(ways: usize, seed: u64) -> Self {
        Self {
            ways: ways.max(1),
            state: seed.max(1),
        }
    }
}

impl ReplacementPolicy for RandomPolicy {
    fn update(&mut self, _set: usize, _way: usize) {}

    fn get_victim(&mut self, _set: usize) -> usize {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x % self.ways as u64) as usize
    }
}
