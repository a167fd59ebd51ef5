//! Memory-side resources shared by the read and write paths.
//!
//! `Backend` owns what both sub-controllers reach downstream: the metadata store, the
//! data port on the metadata bus, main memory, the buses, the hazard tracker, the
//! crypto engine and the statistics. Sub-controllers receive it by `&mut` on every
//! call instead of holding references to each other's resources.

use std::sync::Arc;

use super::Token;
use super::crypto::CryptoEngine;
use super::hazards::HazardTracker;
use super::layout::MetadataLayout;
use super::store::{MemSide, MetadataStore, MetadataUnit, StoreCompletion, StoreOpKind};
use crate::common::{Cycle, SecError};
use crate::soc::interconnect::{BusId, Interconnect};
use crate::soc::memory::MainMemory;
use crate::soc::memory::port::{DataAccess, DataCompletion, DataOp, DataPort};
use crate::stats::SecStats;

/// Downstream state behind `SecCtrl`.
pub struct Backend {
    store: MetadataStore,
    memory: MainMemory,
    interconnect: Interconnect,
    data_port: DataPort<Token>,
    hazards: HazardTracker,
    stats: SecStats,
    crypto: Arc<dyn CryptoEngine>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("store", &self.store)
            .field("memory", &self.memory)
            .field("data_port", &self.data_port)
            .field("hazards", &self.hazards.len())
            .finish_non_exhaustive()
    }
}

impl Backend {
    /// Assembles the backend.
    ///
    /// # Arguments
    ///
    /// * `store` - Metadata store (owns the metadata cache).
    /// * `memory` - Main memory.
    /// * `interconnect` - Metadata and memory buses.
    /// * `data_bus` - Bus carrying data accesses issued through `issue_data`.
    /// * `port_capacity` - Data accesses the port keeps in flight.
    /// * `crypto` - Engine shared with the store.
    pub fn new(
        store: MetadataStore,
        memory: MainMemory,
        interconnect: Interconnect,
        data_bus: BusId,
        port_capacity: usize,
        crypto: Arc<dyn CryptoEngine>,
    ) -> Self {
        Self {
            store,
            memory,
            interconnect,
            data_port: DataPort::new("meta_port", data_bus, port_capacity),
            hazards: HazardTracker::new(),
            stats: SecStats::default(),
            crypto,
        }
    }

    fn side(&mut self) -> (&mut MetadataStore, MemSide<'_>) {
        (
            &mut self.store,
            MemSide {
                memory: &mut self.memory,
                interconnect: &mut self.interconnect,
                stats: &mut self.stats,
            },
        )
    }

    /// Starts a metadata fetch for the block at `block_addr`.
    pub fn fetch_metadata(
        &mut self,
        now: Cycle,
        token: Token,
        block_addr: u64,
    ) -> Result<(), SecError> {
        let (store, mut side) = self.side();
        store.submit_fetch(now, token, block_addr, &mut side)
    }

    /// Starts a metadata update committing `unit`.
    pub fn update_metadata(
        &mut self,
        now: Cycle,
        token: Token,
        unit: MetadataUnit,
    ) -> Result<(), SecError> {
        let (store, mut side) = self.side();
        store.submit_update(now, token, unit, &mut side)
    }

    /// Issues a data access through the shared port.
    ///
    /// # Returns
    ///
    /// The completion cycle, or `SecError::BackPressure` if the port is full.
    pub fn issue_data(&mut self, now: Cycle, access: DataAccess<Token>) -> Result<Cycle, SecError> {
        let is_write = matches!(access.op, DataOp::Write(_));
        let ready = self
            .data_port
            .issue(now, access, &mut self.interconnect, &mut self.memory)?;
        if is_write {
            self.stats.data_writes += 1;
        } else {
            self.stats.data_reads += 1;
        }
        Ok(ready)
    }

    /// Issues a data access through a port owned by a sub-controller.
    pub fn issue_on(
        &mut self,
        port: &mut DataPort<Token>,
        now: Cycle,
        access: DataAccess<Token>,
    ) -> Result<Cycle, SecError> {
        port.issue(now, access, &mut self.interconnect, &mut self.memory)
    }

    /// Completes accesses due on a port owned by a sub-controller.
    pub fn drain_port(&mut self, port: &mut DataPort<Token>, now: Cycle) -> Vec<DataCompletion<Token>> {
        port.drain(now, &mut self.memory)
    }

    /// Advances the store and the shared data port to `now`.
    ///
    /// # Returns
    ///
    /// Metadata completions followed by data completions due this cycle.
    pub fn tick(&mut self, now: Cycle) -> (Vec<StoreCompletion>, Vec<DataCompletion<Token>>) {
        self.stats.cycles = now;
        let metadata = {
            let (store, mut side) = self.side();
            store.tick(now, &mut side)
        };
        let data = self.data_port.drain(now, &mut self.memory);
        (metadata, data)
    }

    /// Fetches a unit with no timing (debug and atomic accesses).
    pub fn fetch_now(&mut self, now: Cycle, block_addr: u64) -> Result<MetadataUnit, SecError> {
        let (store, mut side) = self.side();
        store.fetch_now(now, block_addr, &mut side)
    }

    /// Commits a unit with no timing (debug and atomic accesses).
    pub fn update_now(&mut self, now: Cycle, unit: MetadataUnit) -> Result<MetadataUnit, SecError> {
        let (store, mut side) = self.side();
        store.update_now(now, unit, &mut side)
    }

    /// Estimated latency of a metadata walk for the block at `block_addr`.
    pub fn estimate_metadata(&mut self, block_addr: u64, kind: StoreOpKind) -> u64 {
        let (store, mut side) = self.side();
        store.estimate_latency(block_addr, kind, &mut side)
    }

    /// Writes back and invalidates the whole metadata cache.
    pub fn flush_metadata(&mut self, now: Cycle) -> usize {
        let (store, mut side) = self.side();
        store.flush(now, &mut side)
    }

    /// Returns `true` when neither the store nor the shared port has work in flight.
    pub fn is_idle(&self) -> bool {
        self.store.is_idle() && self.data_port.in_flight() == 0
    }

    /// The crypto engine.
    pub fn crypto(&self) -> &dyn CryptoEngine {
        self.crypto.as_ref()
    }

    /// Metadata placement.
    pub const fn layout(&self) -> &MetadataLayout {
        self.store.layout()
    }

    /// The metadata store.
    pub const fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Main memory.
    pub const fn memory(&self) -> &MainMemory {
        &self.memory
    }

    /// Main memory, for tamper injection and debug writes.
    pub const fn memory_mut(&mut self) -> &mut MainMemory {
        &mut self.memory
    }

    /// Buses.
    pub const fn interconnect(&self) -> &Interconnect {
        &self.interconnect
    }

    /// The shared data port.
    pub const fn data_port(&self) -> &DataPort<Token> {
        &self.data_port
    }

    /// Per-block ordering.
    pub const fn hazards(&self) -> &HazardTracker {
        &self.hazards
    }

    /// Per-block ordering, for registration and retirement.
    pub const fn hazards_mut(&mut self) -> &mut HazardTracker {
        &mut self.hazards
    }

    /// Counters.
    pub const fn stats(&self) -> &SecStats {
        &self.stats
    }

    /// Counters, for updates.
    pub const fn stats_mut(&mut self) -> &mut SecStats {
        &mut self.stats
    }
}
