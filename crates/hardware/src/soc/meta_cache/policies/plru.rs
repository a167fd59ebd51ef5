//! Pseudo-LRU (PLRU) Replacement Policy.
//!
//! Bit-PLRU: one "recently used" bit per way. A use sets the way's bit; when every bit
//! in the set would be set, all bits but the current way's are cleared. The victim is
//! the lowest way whose bit is clear.
//!
//! # Performance
//!
//! - **Time Complexity:** `update()` O(1), `get_victim()` O(W)
//! - **Space Complexity:** one `u64` per set (associativity up to 64)

use super::ReplacementPolicy;

/// PLRU Policy state.
#[derive(Debug)]
pub struct PlruPolicy {
    /// MRU bits of each set.
    usage: Vec<u64>,
    /// Number of ways in the cache.
    ways: usize,
}

impl PlruPolicy {
    /// Creates a new PLRU policy instance.
    ///
    /// # Arguments
    ///
    /// * `sets` - The number of sets in the cache.
    /// * `ways` - The associativity (number of ways) of the cache, at most 64.
    pub fn new(sets: usize, ways: usize) -> Self {
        Self {
            usage: vec![0; sets],
            ways: ways.min(64),
        }
    }

    const fn all_ones(&self) -> u64 {
        if self.ways >= 64 {
            u64::MAX
        } else {
            (1u64 << self.ways) - 1
        }
    }
}

impl ReplacementPolicy for PlruPolicy {
    fn update(&mut self, set: usize, way: usize) {
        let mask = 1u64 << (way % 64);
        let all_ones = self.all_ones();
        let bits = &mut self.usage[set];
        *bits |= mask;
        if *bits & all_ones == all_ones {
            *bits = mask;
        }
    }

    fn get_victim(&mut self, set: usize) -> usize {
        let bits = self.usage[set];
        (0..self.ways).find(|&i| (bits >> i) & 1 == 0).unwrap_or(0)
    }

    fn invalidate(&mut self, set: usize, way: usize) {
        self.usage[set] &= !(1u64 << (way % 64));
    }
}
