//! Metadata Store Interface.
//!
//! Fetches and updates the metadata unit of one data block (counter, MAC and the tree
//! path above the counter) through the metadata cache. It provides:
//! 1. **Line Ownership:** At most one access per metadata line is outstanding. An
//!    operation that needs a line held by another queues behind it in arrival order.
//! 2. **Timing:** Each step probes the cache; a miss takes an MSHR and costs a memory
//!    access over the metadata bus. Fetches stop at the first cached counter or tree
//!    line; updates walk to the top and spend `hash_cycles` per tree line.
//! 3. **Functional Effect:** Applied atomically when the last step completes. Lines
//!    read from memory are verified against their parent (or the on-chip root) before
//!    they are trusted; updates rewrite every ancestor tag up to the root.
//!
//! Lines are acquired in ascending address order (MAC region, counter region, tree
//! levels bottom-up) and released together at completion, so operations cannot wait
//! on each other in a cycle.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::Token;
use super::crypto::{CryptoEngine, Tag, tag_or_pristine};
use super::layout::{MetaPath, MetadataLayout};
use crate::common::addr::{LineAddr, read_slot, write_slot};
use crate::common::constants::{BLOCK_SHIFT, LINE_BYTES};
use crate::common::{Block, Cycle, ProtectedUnit, SecError};
use crate::config::MetaCacheConfig;
use crate::sim::event::TimedQueue;
use crate::soc::interconnect::Interconnect;
use crate::soc::memory::MainMemory;
use crate::soc::meta_cache::{Evicted, MetaCache};
use crate::stats::SecStats;

/// Tree position of the node that covers a block's counter line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ParentRef {
    /// Tree level of the node (1 = directly above the counter lines).
    pub level: u8,
    /// Index of the node within its level.
    pub index: u64,
}

/// The metadata protecting one data block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MetadataUnit {
    /// Base address of the data block.
    pub block_addr: u64,
    /// Write counter; 0 means the block was never written.
    pub counter: u64,
    /// MAC over the block's ciphertext.
    pub mac: Tag,
    /// Node holding the tag of the counter line.
    pub parent: ParentRef,
}

impl MetadataUnit {
    /// Returns the unit with a new counter and MAC.
    #[must_use]
    pub const fn resealed(self, counter: u64, mac: Tag) -> Self {
        Self {
            counter,
            mac,
            ..self
        }
    }
}

/// Kind of store operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOpKind {
    /// Read and verify.
    Fetch,
    /// Write counter and MAC, propagate tags to the root.
    Update,
}

/// A finished store operation, returned by `MetadataStore::tick`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreCompletion {
    /// Token given at submission.
    pub token: Token,
    /// Base address of the data block.
    pub block_addr: u64,
    /// What was done.
    pub kind: StoreOpKind,
    /// The verified (fetch) or committed (update) unit, or the unit that failed
    /// verification.
    pub result: Result<MetadataUnit, ProtectedUnit>,
}

/// Memory-side resources a store operation touches.
#[derive(Debug)]
pub struct MemSide<'a> {
    /// Backing store for metadata lines.
    pub memory: &'a mut MainMemory,
    /// Buses; misses and write-backs occupy the metadata bus.
    pub interconnect: &'a mut Interconnect,
    /// Counters.
    pub stats: &'a mut SecStats,
}

type OpId = u64;

#[derive(Clone, Copy, Debug)]
enum Work {
    Fetch,
    Update(MetadataUnit),
}

impl Work {
    const fn kind(self) -> StoreOpKind {
        match self {
            Self::Fetch => StoreOpKind::Fetch,
            Self::Update(_) => StoreOpKind::Update,
        }
    }
}

#[derive(Debug)]
struct StoreOp {
    token: Token,
    work: Work,
    path: MetaPath,
    lines: Vec<LineAddr>,
    step: usize,
    held: Vec<LineAddr>,
    holds_mshr: bool,
    last_hit: bool,
}

#[derive(Debug)]
struct LineOwner {
    holder: OpId,
    waiters: VecDeque<OpId>,
}

/// Timed, verifying front end to the metadata cache and the metadata regions.
pub struct MetadataStore {
    layout: MetadataLayout,
    cache: MetaCache,
    crypto: Arc<dyn CryptoEngine>,
    root: Tag,
    hash_cycles: u64,
    mshrs: usize,
    max_ops: usize,

    ops: HashMap<OpId, StoreOp>,
    next_op: OpId,
    owners: HashMap<LineAddr, LineOwner>,
    timeline: TimedQueue<OpId>,
    mshr_wait: VecDeque<OpId>,
    mshrs_busy: usize,
    line_outstanding: HashMap<LineAddr, usize>,
    peak_line_outstanding: usize,
    completions: Vec<StoreCompletion>,
}

impl fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataStore")
            .field("layout", &self.layout)
            .field("cache", &self.cache)
            .field("root", &format_args!("{:#018x}", self.root))
            .field("active_ops", &self.ops.len())
            .field("mshrs_busy", &self.mshrs_busy)
            .finish_non_exhaustive()
    }
}

impl MetadataStore {
    /// Creates a store over `layout` with an empty cache and a pristine root.
    ///
    /// # Arguments
    ///
    /// * `layout` - Metadata placement.
    /// * `cache` - Metadata cache geometry, latency, policy and MSHR count.
    /// * `crypto` - Engine used for line tags.
    /// * `hash_cycles` - Latency of one tag computation.
    /// * `max_ops` - Concurrently active operations before back-pressure.
    pub fn new(
        layout: MetadataLayout,
        cache: &MetaCacheConfig,
        crypto: Arc<dyn CryptoEngine>,
        hash_cycles: u64,
        max_ops: usize,
    ) -> Self {
        Self {
            layout,
            cache: MetaCache::new(cache),
            crypto,
            root: 0,
            hash_cycles,
            mshrs: cache.mshrs.max(1),
            max_ops: max_ops.max(1),
            ops: HashMap::new(),
            next_op: 0,
            owners: HashMap::new(),
            timeline: TimedQueue::new(),
            mshr_wait: VecDeque::new(),
            mshrs_busy: 0,
            line_outstanding: HashMap::new(),
            peak_line_outstanding: 0,
            completions: Vec::new(),
        }
    }

    /// Metadata placement.
    pub const fn layout(&self) -> &MetadataLayout {
        &self.layout
    }

    /// The metadata cache.
    pub const fn cache(&self) -> &MetaCache {
        &self.cache
    }

    /// Current on-chip root tag (0 while the whole tree is pristine).
    pub const fn root(&self) -> Tag {
        self.root
    }

    /// Returns `true` if another operation can be submitted.
    pub fn can_accept(&self) -> bool {
        self.ops.len() < self.max_ops
    }

    /// Operations in flight.
    pub fn active_ops(&self) -> usize {
        self.ops.len()
    }

    /// Returns `true` when no operation is in flight.
    pub fn is_idle(&self) -> bool {
        self.ops.is_empty()
    }

    /// Accesses currently outstanding to `line`.
    pub fn line_outstanding(&self, line: LineAddr) -> usize {
        self.line_outstanding.get(&line).copied().unwrap_or(0)
    }

    /// Highest number of accesses ever outstanding to a single line.
    pub const fn peak_line_outstanding(&self) -> usize {
        self.peak_line_outstanding
    }

    /// Operations queued behind the current holder of `line`.
    pub fn waiters(&self, line: LineAddr) -> usize {
        self.owners.get(&line).map_or(0, |o| o.waiters.len())
    }

    /// Starts a fetch of the unit protecting the block at `block_addr`.
    ///
    /// # Returns
    ///
    /// `SecError::BackPressure` when `max_ops` operations are already active.
    pub fn submit_fetch(
        &mut self,
        now: Cycle,
        token: Token,
        block_addr: u64,
        side: &mut MemSide<'_>,
    ) -> Result<(), SecError> {
        self.submit(now, token, block_addr, Work::Fetch, side)
    }

    /// Starts an update that commits `unit` and propagates it to the root.
    ///
    /// # Returns
    ///
    /// `SecError::BackPressure` when `max_ops` operations are already active.
    pub fn submit_update(
        &mut self,
        now: Cycle,
        token: Token,
        unit: MetadataUnit,
        side: &mut MemSide<'_>,
    ) -> Result<(), SecError> {
        self.submit(now, token, unit.block_addr, Work::Update(unit), side)
    }

    fn submit(
        &mut self,
        now: Cycle,
        token: Token,
        block_addr: u64,
        work: Work,
        side: &mut MemSide<'_>,
    ) -> Result<(), SecError> {
        if !self.can_accept() {
            return Err(SecError::BackPressure {
                port: "metadata_store",
            });
        }
        let path = self.layout.path(block_addr >> BLOCK_SHIFT);
        let lines = path.lines();
        let id = self.next_op;
        self.next_op += 1;

        debug!(
            id = %token.id,
            addr = block_addr,
            op = ?work.kind(),
            cycle = now,
            "metadata operation submitted"
        );
        let _ = self.ops.insert(
            id,
            StoreOp {
                token,
                work,
                path,
                lines,
                step: 0,
                held: Vec::new(),
                holds_mshr: false,
                last_hit: false,
            },
        );
        side.stats.peak_store_ops = side.stats.peak_store_ops.max(self.ops.len());
        self.enter_step(now, id, side);
        Ok(())
    }

    /// Advances the store to `now`.
    ///
    /// Finishes every step due at `now` (which may complete operations and hand
    /// lines to waiters), then retries operations waiting for an MSHR.
    ///
    /// # Returns
    ///
    /// Operations completed this cycle, in completion order.
    pub fn tick(&mut self, now: Cycle, side: &mut MemSide<'_>) -> Vec<StoreCompletion> {
        while let Some(id) = self.timeline.pop_due(now) {
            self.finish_step(now, id, side);
        }
        let waiting: Vec<OpId> = self.mshr_wait.drain(..).collect();
        for id in waiting {
            self.probe(now, id, side);
        }
        std::mem::take(&mut self.completions)
    }

    fn enter_step(&mut self, now: Cycle, id: OpId, side: &mut MemSide<'_>) {
        let Some(op) = self.ops.get_mut(&id) else {
            return;
        };
        let line = op.lines[op.step];
        match self.owners.get_mut(&line) {
            Some(owner) if owner.holder != id => {
                owner.waiters.push_back(id);
                side.stats.line_waits += 1;
                trace!(id = %op.token.id, %line, "waiting for metadata line");
                return;
            }
            Some(_) => {}
            None => {
                let _ = self.owners.insert(
                    line,
                    LineOwner {
                        holder: id,
                        waiters: VecDeque::new(),
                    },
                );
                op.held.push(line);
            }
        }
        self.probe(now, id, side);
    }

    fn probe(&mut self, now: Cycle, id: OpId, side: &mut MemSide<'_>) {
        let Some(op) = self.ops.get_mut(&id) else {
            return;
        };
        let line = op.lines[op.step];
        let tree_line = op.step > 0;
        let hit = self.cache.touch(line);
        let mut latency = self.cache.latency;

        if hit {
            side.stats.meta_hits += 1;
        } else {
            if self.mshrs_busy >= self.mshrs {
                self.mshr_wait.push_back(id);
                side.stats.mshr_stalls += 1;
                return;
            }
            self.mshrs_busy += 1;
            op.holds_mshr = true;
            side.stats.meta_misses += 1;
            latency += side.interconnect.meta_bus.reserve(now, LINE_BYTES)
                + side.memory.access_latency(line.val());
            if matches!(op.work, Work::Fetch) && tree_line {
                latency += self.hash_cycles;
            }
        }
        if matches!(op.work, Work::Update(_)) && tree_line {
            latency += self.hash_cycles;
        }
        op.last_hit = hit;

        let outstanding = self.line_outstanding.entry(line).or_insert(0);
        *outstanding += 1;
        self.peak_line_outstanding = self.peak_line_outstanding.max(*outstanding);
        side.stats.peak_line_outstanding = side.stats.peak_line_outstanding.max(*outstanding);

        trace!(id = %op.token.id, %line, hit, ready = now + latency, "metadata probe");
        self.timeline.schedule(now + latency, id);
    }

    fn finish_step(&mut self, now: Cycle, id: OpId, side: &mut MemSide<'_>) {
        let done = {
            let Some(op) = self.ops.get_mut(&id) else {
                return;
            };
            let line = op.lines[op.step];
            if op.holds_mshr {
                op.holds_mshr = false;
                self.mshrs_busy = self.mshrs_busy.saturating_sub(1);
            }
            let drained = self.line_outstanding.get_mut(&line).is_some_and(|n| {
                *n = n.saturating_sub(1);
                *n == 0
            });
            if drained {
                let _ = self.line_outstanding.remove(&line);
            }

            let last = op.step + 1 == op.lines.len();
            let anchored = matches!(op.work, Work::Fetch) && op.step >= 1 && op.last_hit;
            if !(last || anchored) {
                op.step += 1;
            }
            last || anchored
        };

        if done {
            self.complete(now, id, side);
        } else {
            self.enter_step(now, id, side);
        }
    }

    fn complete(&mut self, now: Cycle, id: OpId, side: &mut MemSide<'_>) {
        let Some(op) = self.ops.remove(&id) else {
            return;
        };
        let block_addr = self.layout.block_addr(op.path.block);
        let result = match op.work {
            Work::Fetch => self.apply_fetch(now, &op.path, side),
            Work::Update(unit) => self.apply_update(now, &op.path, unit, side),
        };
        match &result {
            Ok(unit) => debug!(
                id = %op.token.id,
                addr = block_addr,
                counter = unit.counter,
                cycle = now,
                "metadata operation complete"
            ),
            Err(unit) => warn!(
                id = %op.token.id,
                addr = block_addr,
                %unit,
                cycle = now,
                "metadata verification failed"
            ),
        }
        self.completions.push(StoreCompletion {
            token: op.token,
            block_addr,
            kind: op.work.kind(),
            result,
        });
        for line in op.held {
            self.release(now, line, side);
        }
    }

    fn release(&mut self, now: Cycle, line: LineAddr, side: &mut MemSide<'_>) {
        let next = self
            .owners
            .get_mut(&line)
            .and_then(|owner| owner.waiters.pop_front());
        let Some(waiter) = next else {
            let _ = self.owners.remove(&line);
            return;
        };
        if let Some(owner) = self.owners.get_mut(&line) {
            owner.holder = waiter;
        }
        if let Some(op) = self.ops.get_mut(&waiter) {
            op.held.push(line);
        }
        trace!(%line, "metadata line handed over");
        self.probe(now, waiter, side);
    }

    /// Fetches and verifies a unit immediately, with no timing.
    ///
    /// # Returns
    ///
    /// The verified unit, or `SecError::IntegrityViolation` naming the failing unit.
    pub fn fetch_now(
        &mut self,
        now: Cycle,
        block_addr: u64,
        side: &mut MemSide<'_>,
    ) -> Result<MetadataUnit, SecError> {
        let path = self.layout.path(block_addr >> BLOCK_SHIFT);
        self.apply_fetch(now, &path, side)
            .map_err(|unit| SecError::IntegrityViolation {
                addr: block_addr,
                unit,
            })
    }

    /// Commits a unit immediately, with no timing.
    ///
    /// # Returns
    ///
    /// The committed unit, or `SecError::IntegrityViolation` if the existing path
    /// failed verification (nothing is written in that case).
    pub fn update_now(
        &mut self,
        now: Cycle,
        unit: MetadataUnit,
        side: &mut MemSide<'_>,
    ) -> Result<MetadataUnit, SecError> {
        let path = self.layout.path(unit.block_addr >> BLOCK_SHIFT);
        self.apply_update(now, &path, unit, side)
            .map_err(|failed| SecError::IntegrityViolation {
                addr: unit.block_addr,
                unit: failed,
            })
    }

    /// Latency a timed operation would take against the current cache contents.
    ///
    /// Ignores line ownership, MSHR limits and bus contention.
    pub fn estimate_latency(
        &self,
        block_addr: u64,
        kind: StoreOpKind,
        side: &mut MemSide<'_>,
    ) -> u64 {
        let path = self.layout.path(block_addr >> BLOCK_SHIFT);
        let transit = side.interconnect.meta_bus.calculate_transit_time(LINE_BYTES);
        let mut total = 0;
        for (step, line) in path.lines().into_iter().enumerate() {
            let tree_line = step > 0;
            let hit = self.cache.contains(line);
            total += self.cache.latency;
            if !hit {
                total += transit + side.memory.access_latency(line.val());
                if kind == StoreOpKind::Fetch && tree_line {
                    total += self.hash_cycles;
                }
            }
            match kind {
                StoreOpKind::Update if tree_line => total += self.hash_cycles,
                StoreOpKind::Fetch if tree_line && hit => break,
                _ => {}
            }
        }
        total
    }

    /// Writes back every dirty line and empties the cache.
    ///
    /// # Returns
    ///
    /// Number of lines written back.
    pub fn flush(&mut self, now: Cycle, side: &mut MemSide<'_>) -> usize {
        let dirty = self.cache.flush();
        let count = dirty.len();
        for victim in dirty {
            Self::write_back(now, victim, side);
        }
        debug!(lines = count, cycle = now, "metadata cache flushed");
        count
    }

    fn apply_fetch(
        &mut self,
        now: Cycle,
        path: &MetaPath,
        side: &mut MemSide<'_>,
    ) -> Result<MetadataUnit, ProtectedUnit> {
        let chain = self.load_chain(now, path, false, side)?;
        let mac_line = self.load_mac_line(now, path.mac.line, side);
        Ok(self.unit_of(path, &chain[0], &mac_line))
    }

    fn apply_update(
        &mut self,
        now: Cycle,
        path: &MetaPath,
        unit: MetadataUnit,
        side: &mut MemSide<'_>,
    ) -> Result<MetadataUnit, ProtectedUnit> {
        let mut chain = self.load_chain(now, path, true, side)?;
        let mut mac_line = self.load_mac_line(now, path.mac.line, side);

        path.mac.write(&mut mac_line, unit.mac);
        path.counter.write(&mut chain[0], unit.counter);
        for k in 1..chain.len() {
            let child = &path.chain[k - 1];
            let tag = tag_or_pristine(self.crypto.as_ref(), child.line.val(), &chain[k - 1]);
            write_slot(&mut chain[k], child.parent_slot(), tag);
        }
        if let (Some(top), Some(line)) = (path.chain.last(), chain.last()) {
            self.root = tag_or_pristine(self.crypto.as_ref(), top.line.val(), line);
        }

        self.fill(now, path.mac.line, mac_line, true, side);
        for (link, line) in path.chain.iter().zip(chain.iter()) {
            self.fill(now, link.line, *line, true, side);
        }
        Ok(self.unit_of(path, &chain[0], &mac_line))
    }

    /// Reads the counter line and its ancestors, verifying every line that came from
    /// memory against its parent. With `full` unset the walk stops at the first
    /// cached line, which is trusted.
    fn load_chain(
        &mut self,
        now: Cycle,
        path: &MetaPath,
        full: bool,
        side: &mut MemSide<'_>,
    ) -> Result<Vec<Block>, ProtectedUnit> {
        let mut values: Vec<(Block, bool)> = Vec::with_capacity(path.chain.len());
        for link in &path.chain {
            if let Some(cached) = self.cache.get(link.line) {
                values.push((*cached, false));
                if !full {
                    break;
                }
            } else {
                side.stats.meta_mem_reads += 1;
                values.push((side.memory.read_line(link.line.val()), true));
            }
        }

        // Top-down, so a tampered node is blamed rather than the child it vouches for.
        for k in (0..values.len()).rev() {
            let (line, from_memory) = &values[k];
            if !from_memory {
                continue;
            }
            let link = &path.chain[k];
            let expected = match values.get(k + 1) {
                Some((parent, _)) => read_slot(parent, link.parent_slot()),
                None => self.root,
            };
            if tag_or_pristine(self.crypto.as_ref(), link.line.val(), line) != expected {
                return Err(link.kind().unit());
            }
        }

        for (link, (line, from_memory)) in path.chain.iter().zip(values.iter()) {
            if *from_memory {
                self.fill(now, link.line, *line, false, side);
            }
        }
        Ok(values.into_iter().map(|(line, _)| line).collect())
    }

    fn load_mac_line(&mut self, now: Cycle, line: LineAddr, side: &mut MemSide<'_>) -> Block {
        if let Some(cached) = self.cache.get(line) {
            return *cached;
        }
        side.stats.meta_mem_reads += 1;
        let data = side.memory.read_line(line.val());
        self.fill(now, line, data, false, side);
        data
    }

    fn unit_of(&self, path: &MetaPath, counter_line: &Block, mac_line: &Block) -> MetadataUnit {
        let parent = path.link(1).map_or(
            ParentRef { level: 1, index: 0 },
            |link| ParentRef {
                level: link.level,
                index: link.index,
            },
        );
        MetadataUnit {
            block_addr: self.layout.block_addr(path.block),
            counter: path.counter.read(counter_line),
            mac: path.mac.read(mac_line),
            parent,
        }
    }

    fn fill(&mut self, now: Cycle, line: LineAddr, data: Block, dirty: bool, side: &mut MemSide<'_>) {
        if let Some(victim) = self.cache.install(line, data, dirty) {
            Self::write_back(now, victim, side);
        }
    }

    fn write_back(now: Cycle, victim: Evicted, side: &mut MemSide<'_>) {
        let _ = side.interconnect.meta_bus.reserve(now, LINE_BYTES);
        side.memory.write_line(victim.line.val(), victim.data);
        side.stats.meta_writebacks += 1;
        trace!(line = %victim.line, cycle = now, "metadata line written back");
    }
}
