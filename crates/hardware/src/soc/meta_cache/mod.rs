//! Set-Associative Metadata Cache.
//!
//! This module implements the on-chip cache for metadata lines (MACs, counters and
//! tree nodes). Unlike a timing-only cache it keeps line contents, because cached
//! metadata is the trusted copy: a line found here needs no verification.
//!
//! The cache is a leaf component. Timing is charged by the metadata store; the cache
//! only answers presence, holds contents, picks victims and reports dirty evictions.

/// Cache replacement policy implementations (FIFO, LRU, MRU, PLRU, Random).
pub mod policies;

use std::fmt;

use self::policies::{
    FifoPolicy, LruPolicy, MruPolicy, PlruPolicy, RandomPolicy, ReplacementPolicy,
};
use crate::common::constants::LINE_BYTES;
use crate::common::{Block, LineAddr};
use crate::config::{MetaCacheConfig, ReplacementPolicy as PolicyType};

/// Cache line entry containing tag, validity, dirty bit and contents.
#[derive(Clone)]
struct CacheLine {
    tag: u64,
    valid: bool,
    dirty: bool,
    data: Block,
}

impl Default for CacheLine {
    fn default() -> Self {
        Self {
            tag: 0,
            valid: false,
            dirty: false,
            data: [0u8; LINE_BYTES],
        }
    }
}

/// A dirty line pushed out of the cache that must be written back to memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evicted {
    /// Address of the evicted line.
    pub line: LineAddr,
    /// Its contents.
    pub data: Block,
}

/// Set-associative cache of 64-byte metadata lines.
pub struct MetaCache {
    /// Probe latency in cycles.
    pub latency: u64,
    lines: Vec<CacheLine>,
    num_sets: usize,
    ways: usize,
    policy: Box<dyn ReplacementPolicy + Send + Sync>,
    evictions: u64,
}

impl fmt::Debug for MetaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaCache")
            .field("sets", &self.num_sets)
            .field("ways", &self.ways)
            .field("latency", &self.latency)
            .field("occupancy", &self.occupancy())
            .field("evictions", &self.evictions)
            .finish_non_exhaustive()
    }
}

impl MetaCache {
    /// Creates a metadata cache with the specified configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Capacity, associativity, latency and replacement policy.
    ///
    /// # Returns
    ///
    /// An empty cache. Zero sizes fall back to a single-set, single-way cache.
    pub fn new(config: &MetaCacheConfig) -> Self {
        let ways = config.ways.max(1);
        let num_sets = (config.size_bytes / LINE_BYTES / ways).max(1);

        let policy: Box<dyn ReplacementPolicy + Send + Sync> = match config.policy {
            PolicyType::Fifo => Box::new(FifoPolicy::new(num_sets, ways)),
            PolicyType::Random => Box::new(RandomPolicy::new(num_sets, ways)),
            PolicyType::Plru => Box::new(PlruPolicy::new(num_sets, ways)),
            PolicyType::Lru => Box::new(LruPolicy::new(num_sets, ways)),
            PolicyType::Mru => Box::new(MruPolicy::new(num_sets, ways)),
        };

        Self {
            latency: config.latency,
            lines: vec![CacheLine::default(); num_sets * ways],
            num_sets,
            ways,
            policy,
            evictions: 0,
        }
    }

    fn locate(&self, line: LineAddr) -> (usize, u64) {
        let index = line.val() / LINE_BYTES as u64;
        let set = (index % self.num_sets as u64) as usize;
        let tag = index / self.num_sets as u64;
        (set, tag)
    }

    fn find(&self, line: LineAddr) -> Option<(usize, usize)> {
        let (set, tag) = self.locate(line);
        let base = set * self.ways;
        (0..self.ways)
            .find(|&way| {
                let entry = &self.lines[base + way];
                entry.valid && entry.tag == tag
            })
            .map(|way| (set, way))
    }

    const fn line_addr(&self, set: usize, tag: u64) -> LineAddr {
        LineAddr((tag * self.num_sets as u64 + set as u64) * LINE_BYTES as u64)
    }

    /// Returns `true` if the line is cached. Does not touch replacement state.
    pub fn contains(&self, line: LineAddr) -> bool {
        self.find(line).is_some()
    }

    /// Records a use of the line with the replacement policy.
    ///
    /// # Returns
    ///
    /// `true` on a hit, `false` if the line is not cached.
    pub fn touch(&mut self, line: LineAddr) -> bool {
        match self.find(line) {
            Some((set, way)) => {
                self.policy.update(set, way);
                true
            }
            None => false,
        }
    }

    /// Returns the cached contents of a line without touching replacement state.
    pub fn get(&self, line: LineAddr) -> Option<&Block> {
        self.find(line)
            .map(|(set, way)| &self.lines[set * self.ways + way].data)
    }

    /// Returns `true` if the line is cached and modified relative to memory.
    pub fn is_dirty(&self, line: LineAddr) -> bool {
        self.find(line)
            .is_some_and(|(set, way)| self.lines[set * self.ways + way].dirty)
    }

    /// Installs or overwrites a line.
    ///
    /// A line already present is updated in place; its dirty bit is the OR of the old
    /// bit and `dirty`. Otherwise an invalid way is used if the set has one, and the
    /// policy's victim if not.
    ///
    /// # Arguments
    ///
    /// * `line` - Line address.
    /// * `data` - New contents.
    /// * `dirty` - Whether the contents differ from memory.
    ///
    /// # Returns
    ///
    /// The displaced line if it was valid and dirty.
    pub fn install(&mut self, line: LineAddr, data: Block, dirty: bool) -> Option<Evicted> {
        if let Some((set, way)) = self.find(line) {
            let entry = &mut self.lines[set * self.ways + way];
            entry.data = data;
            entry.dirty |= dirty;
            self.policy.update(set, way);
            return None;
        }

        let (set, tag) = self.locate(line);
        let base = set * self.ways;
        let way = (0..self.ways)
            .find(|&w| !self.lines[base + w].valid)
            .unwrap_or_else(|| self.policy.get_victim(set));

        let victim = &self.lines[base + way];
        if victim.valid {
            self.evictions += 1;
        }
        let evicted = (victim.valid && victim.dirty).then(|| Evicted {
            line: self.line_addr(set, victim.tag),
            data: victim.data,
        });

        self.lines[base + way] = CacheLine {
            tag,
            valid: true,
            dirty,
            data,
        };
        self.policy.update(set, way);
        evicted
    }

    /// Drops a line from the cache.
    ///
    /// # Returns
    ///
    /// The line's contents if it was dirty, so the caller can write them back.
    pub fn invalidate(&mut self, line: LineAddr) -> Option<Evicted> {
        let (set, way) = self.find(line)?;
        let idx = set * self.ways + way;
        let entry = std::mem::take(&mut self.lines[idx]);
        self.policy.invalidate(set, way);
        entry.dirty.then_some(Evicted {
            line,
            data: entry.data,
        })
    }

    /// Invalidates every line.
    ///
    /// # Returns
    ///
    /// All lines that were dirty, for write-back.
    pub fn flush(&mut self) -> Vec<Evicted> {
        let mut dirty = Vec::new();
        for idx in 0..self.lines.len() {
            if !self.lines[idx].valid {
                continue;
            }
            let (set, way) = (idx / self.ways, idx % self.ways);
            let entry = std::mem::take(&mut self.lines[idx]);
            self.policy.invalidate(set, way);
            if entry.dirty {
                dirty.push(Evicted {
                    line: self.line_addr(set, entry.tag),
                    data: entry.data,
                });
            }
        }
        dirty
    }

    /// Number of valid lines.
    pub fn occupancy(&self) -> usize {
        self.lines.iter().filter(|l| l.valid).count()
    }

    /// Valid lines displaced by installs so far (clean or dirty).
    pub const fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Total number of lines the cache can hold.
    pub const fn capacity(&self) -> usize {
        self.num_sets * self.ways
    }
}
