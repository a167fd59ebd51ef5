//! Scheme assembly and the top-level `SecureMemory` type.
//!
//! This module builds the complete secure memory subsystem from configuration. It performs:
//! 1. **Topology:** Chooses which bus carries metadata and data, and whether writes get
//!    a bypass path (MT) or not (CT).
//! 2. **Component setup:** Creates the layout, metadata store and cache, main memory with
//!    its latency model, the buses, and both sub-controllers behind `SecCtrl`.
//! 3. **Upstream port:** `try_send`, `recv_response`, `take_retry` and `tick`.
//! 4. **Debug access:** Untimed functional reads and writes, atomic accesses with an
//!    estimated latency, tamper injection and metadata cache flushes.

use std::sync::Arc;

use tracing::{debug, info};

use crate::common::{
    Cycle, Direction, MemRequest, MemResponse, Outcome, PhysAddr, ProtectedUnit, Rejected,
    RequestId, SecError,
};
use crate::common::constants::{BLOCK_BYTES, SLOT_BYTES};
use crate::config::{Config, Scheme};
use crate::secure::crypto::{self, Blake3Engine, CryptoEngine};
use crate::secure::store::StoreOpKind;
use crate::secure::{Backend, MetadataLayout, MetadataStore, ReadCtrl, SecCtrl, WriteCtrl};
use crate::soc::interconnect::{BusId, Interconnect};
use crate::soc::memory::MainMemory;
use crate::soc::memory::controller::{self, MemoryController};
use crate::soc::memory::port::DataPort;
use crate::stats::SecStats;

/// Port wiring of one scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Topology {
    /// Scheme the wiring implements.
    pub scheme: Scheme,
    /// Bus carrying metadata traffic and every data access except MT writes.
    pub metadata_bus: BusId,
    /// Bus of the write bypass port (MT only).
    pub write_bypass: Option<BusId>,
}

impl Topology {
    /// Canonical wiring: CT puts everything on the metadata bus, MT adds a bypass for
    /// data writes on the memory bus.
    pub const fn for_scheme(scheme: Scheme) -> Self {
        match scheme {
            Scheme::Ct => Self {
                scheme,
                metadata_bus: BusId::Meta,
                write_bypass: None,
            },
            Scheme::Mt => Self {
                scheme,
                metadata_bus: BusId::Meta,
                write_bypass: Some(BusId::Mem),
            },
        }
    }

    /// Checks that the wiring is consistent with its scheme.
    pub fn validate(&self) -> Result<(), SecError> {
        match (self.scheme, self.write_bypass) {
            (Scheme::Ct, Some(_)) => Err(SecError::Config(
                "CT topology cannot have a write bypass".into(),
            )),
            (Scheme::Mt, None) => Err(SecError::Config(
                "MT topology needs a write bypass".into(),
            )),
            (Scheme::Mt, Some(bus)) if bus == self.metadata_bus => Err(SecError::Config(
                "MT write bypass must not share the metadata bus".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// A complete secure memory: `SecCtrl`, both paths and everything behind them.
#[derive(Debug)]
pub struct SecureMemory {
    topology: Topology,
    hash_cycles: u64,
    sec_ctrl: SecCtrl<ReadCtrl, WriteCtrl>,
    backend: Backend,
    now: Cycle,
}

impl SecureMemory {
    /// Builds the subsystem described by `config` with the BLAKE3 engine.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated or unvalidated configuration.
    ///
    /// # Returns
    ///
    /// The assembled subsystem at cycle 0, or `SecError::Config`.
    pub fn new(config: &Config) -> Result<Self, SecError> {
        config.validate()?;
        let crypto: Arc<dyn CryptoEngine> = Arc::new(Blake3Engine::new(config.crypto.key_seed));
        Self::with_parts(
            config,
            Topology::for_scheme(config.scheme),
            crypto,
            controller::from_config(&config.memory),
        )
    }

    /// Builds the subsystem from explicit parts.
    ///
    /// # Arguments
    ///
    /// * `config` - Sizes, latencies and queue depths.
    /// * `topology` - Port wiring; its scheme overrides `config.scheme`.
    /// * `crypto` - Engine for tags, MACs and keystream.
    /// * `mem_controller` - Main-memory latency model.
    pub fn with_parts(
        config: &Config,
        topology: Topology,
        crypto: Arc<dyn CryptoEngine>,
        mem_controller: Box<dyn MemoryController + Send + Sync>,
    ) -> Result<Self, SecError> {
        topology.validate()?;
        let ctrl = &config.controller;
        let hash_cycles = config.crypto.hash_cycles;

        let layout = MetadataLayout::new(config.layout.protected_bytes)?;
        let levels = layout.levels();
        let store = MetadataStore::new(
            layout,
            &config.meta_cache,
            Arc::clone(&crypto),
            hash_cycles,
            ctrl.store_ops,
        );
        let backend = Backend::new(
            store,
            MainMemory::new(mem_controller),
            Interconnect::new(&config.bus),
            topology.metadata_bus,
            ctrl.port_queue,
            crypto,
        );

        let bypass = topology
            .write_bypass
            .map(|bus| DataPort::new("bypass_port", bus, ctrl.port_queue));
        let write = WriteCtrl::new(topology.scheme, ctrl.write_queue, hash_cycles, bypass)?;
        let read = ReadCtrl::new(ctrl.read_queue, hash_cycles);
        let sec_ctrl = SecCtrl::new(
            read,
            write,
            config.layout.protected_bytes,
            ctrl.response_queue,
        );

        info!(
            scheme = %topology.scheme,
            protected_bytes = config.layout.protected_bytes,
            tree_levels = levels,
            "secure memory assembled"
        );
        Ok(Self {
            topology,
            hash_cycles,
            sec_ctrl,
            backend,
            now: 0,
        })
    }

    /// Current cycle.
    pub const fn now(&self) -> Cycle {
        self.now
    }

    /// Scheme in use.
    pub const fn scheme(&self) -> Scheme {
        self.topology.scheme
    }

    /// Port wiring in use.
    pub const fn topology(&self) -> Topology {
        self.topology
    }

    /// Protected address range `[start, end)`.
    pub const fn addr_range(&self) -> (u64, u64) {
        self.sec_ctrl.addr_range()
    }

    /// Offers a request at the current cycle.
    ///
    /// # Returns
    ///
    /// The request back on back-pressure (wait for `take_retry`) or validation failure.
    pub fn try_send(&mut self, request: MemRequest) -> Result<(), Rejected> {
        self.sec_ctrl.try_send(self.now, request, &mut self.backend)
    }

    /// Takes the oldest response, if any.
    pub fn recv_response(&mut self) -> Option<MemResponse> {
        self.sec_ctrl.recv_response()
    }

    /// Returns `true` once after room frees following a back-pressure refusal.
    pub fn take_retry(&mut self) -> bool {
        self.sec_ctrl.take_retry()
    }

    /// Advances one cycle.
    pub fn tick(&mut self) {
        self.now += 1;
        self.sec_ctrl.tick(self.now, &mut self.backend);
    }

    /// Requests accepted and not yet retired.
    pub fn outstanding(&self) -> usize {
        self.sec_ctrl.outstanding()
    }

    /// Returns `true` when nothing is in flight and no response is waiting.
    pub fn is_idle(&self) -> bool {
        self.sec_ctrl.outstanding() == 0
            && self.sec_ctrl.queued_responses() == 0
            && self.backend.is_idle()
    }

    /// Ticks until idle, collecting every response.
    ///
    /// # Returns
    ///
    /// The responses in delivery order, or `SecError::CycleLimit` if the subsystem
    /// is still busy after `max_cycles` cycles.
    pub fn run_until_idle(&mut self, max_cycles: u64) -> Result<Vec<MemResponse>, SecError> {
        let mut responses = Vec::new();
        let start = self.now;
        while !self.is_idle() {
            if self.now - start >= max_cycles {
                return Err(SecError::CycleLimit {
                    limit: max_cycles,
                    outstanding: self.outstanding(),
                });
            }
            self.tick();
            while let Some(response) = self.recv_response() {
                responses.push(response);
            }
        }
        Ok(responses)
    }

    fn ensure_quiet(&self, addr: u64) -> Result<(), SecError> {
        let addr = PhysAddr::new(addr);
        if self.backend.hazards().in_flight(addr.block()) > 0 {
            return Err(SecError::BlockBusy {
                addr: addr.block_base().val(),
            });
        }
        Ok(())
    }

    /// Reads plaintext with no timing, verifying exactly like a timed read.
    ///
    /// # Returns
    ///
    /// The bytes, a validation error, `BlockBusy` if timed requests to the block are
    /// in flight, or `IntegrityViolation`.
    pub fn functional_read(&mut self, addr: u64, size: usize) -> Result<Vec<u8>, SecError> {
        self.sec_ctrl.validate_shape(&MemRequest::read(0, addr, size))?;
        self.ensure_quiet(addr)?;
        let addr = PhysAddr::new(addr);
        let base = addr.block_base().val();

        let unit = self.backend.fetch_now(self.now, base)?;
        let ciphertext = self.backend.memory().peek_line(base);
        let plain = crypto::open(self.backend.crypto(), base, unit.counter, unit.mac, &ciphertext)
            .map_err(|unit| SecError::IntegrityViolation { addr: base, unit })?;
        let offset = addr.block_offset();
        Ok(plain
            .get(offset..offset + size)
            .map(<[u8]>::to_vec)
            .unwrap_or_default())
    }

    /// Writes plaintext with no timing, committing metadata exactly like a timed write.
    ///
    /// # Returns
    ///
    /// A validation error, `BlockBusy`, or `IntegrityViolation` if the existing block
    /// or its metadata fails verification (nothing is written then).
    pub fn functional_write(&mut self, addr: u64, data: &[u8]) -> Result<(), SecError> {
        self.sec_ctrl.validate_shape(&MemRequest::write(0, addr, data.to_vec()))?;
        self.ensure_quiet(addr)?;
        let addr = PhysAddr::new(addr);
        let base = addr.block_base().val();

        let unit = self.backend.fetch_now(self.now, base)?;
        let mut plain = if data.len() as u64 == BLOCK_BYTES {
            [0u8; 64]
        } else {
            let old = self.backend.memory().peek_line(base);
            crypto::open(self.backend.crypto(), base, unit.counter, unit.mac, &old)
                .map_err(|unit| SecError::IntegrityViolation { addr: base, unit })?
        };
        let offset = addr.block_offset();
        if let Some(dst) = plain.get_mut(offset..offset + data.len()) {
            dst.copy_from_slice(data);
        }

        let counter = unit.counter.saturating_add(1);
        let (ciphertext, mac) = crypto::seal(self.backend.crypto(), base, counter, &plain);
        let _ = self.backend.update_now(self.now, unit.resealed(counter, mac))?;
        self.backend.memory_mut().write_line(base, ciphertext);
        debug!(addr = base, counter, "functional write");
        Ok(())
    }

    /// Performs a request immediately.
    ///
    /// # Returns
    ///
    /// The response (an integrity failure becomes `Outcome::IntegrityFault`) and the
    /// latency the request would have taken against the current cache contents.
    pub fn atomic_access(&mut self, request: MemRequest) -> Result<(MemResponse, u64), SecError> {
        self.sec_ctrl.validate_shape(&request)?;
        self.ensure_quiet(request.addr.val())?;
        let base = request.addr.block_base().val();

        let fetch = self.backend.estimate_metadata(base, StoreOpKind::Fetch);
        let memory = self.backend.memory_mut().access_latency(base);
        let data = memory + self.transit_estimate(self.topology.metadata_bus);
        let latency = match request.direction {
            Direction::Read => fetch + data + self.hash_cycles,
            Direction::Write => {
                let update = self.backend.estimate_metadata(base, StoreOpKind::Update);
                let merge = if request.is_full_block() { 0 } else { data };
                let commit = match self.topology.write_bypass {
                    Some(bypass) => update.max(memory + self.transit_estimate(bypass)),
                    None => update + data,
                };
                fetch + merge + self.hash_cycles + commit
            }
        };

        let result = match request.direction {
            Direction::Read => self
                .functional_read(request.addr.val(), request.size)
                .map(Outcome::Data),
            Direction::Write => {
                let payload = request.payload.as_deref().unwrap_or_default();
                self.functional_write(request.addr.val(), payload)
                    .map(|()| Outcome::WriteAck)
            }
        };
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(SecError::IntegrityViolation { unit, .. }) => Outcome::IntegrityFault(unit),
            Err(e) => return Err(e),
        };
        Ok((
            MemResponse {
                id: request.id,
                addr: request.addr,
                direction: request.direction,
                outcome,
            },
            latency,
        ))
    }

    fn transit_estimate(&self, bus: BusId) -> u64 {
        self.backend
            .interconnect()
            .bus(bus)
            .calculate_transit_time(BLOCK_BYTES as usize)
    }

    /// Flips a bit in the off-chip copy of one protected unit of the block at `addr`.
    ///
    /// The metadata cache is flushed first, so the next access must fetch (and verify)
    /// the corrupted copy.
    ///
    /// # Arguments
    ///
    /// * `addr` - Any address in the target block.
    /// * `unit` - Which unit to corrupt; `TreeNode(k)` is the level-k node on the
    ///   block's path.
    pub fn tamper(&mut self, addr: u64, unit: ProtectedUnit) -> Result<(), SecError> {
        let addr = PhysAddr::new(addr);
        if !self.backend.layout().contains(addr.val()) {
            return Err(SecError::OutOfRange {
                id: RequestId(0),
                addr: addr.val(),
            });
        }
        let _ = self.flush_metadata_cache();

        let path = self.backend.layout().path(addr.block());
        let target = match unit {
            ProtectedUnit::Data => addr.block_base().val(),
            ProtectedUnit::Mac => path.mac.byte_addr(),
            ProtectedUnit::Counter => path.counter.byte_addr(),
            ProtectedUnit::TreeNode(level) => {
                let (Some(node), Some(child)) = (path.link(level), path.link(level.wrapping_sub(1)))
                else {
                    return Err(SecError::Config(format!(
                        "tree level {level} does not exist (levels 1..={})",
                        self.backend.layout().levels()
                    )));
                };
                node.line.val() + child.parent_slot() as u64 * SLOT_BYTES
            }
        };
        self.backend.memory_mut().corrupt(target, 0x01);
        debug!(addr = addr.val(), %unit, target, "tampered");
        Ok(())
    }

    /// Writes back and invalidates every metadata line.
    ///
    /// # Returns
    ///
    /// Number of dirty lines written back.
    pub fn flush_metadata_cache(&mut self) -> usize {
        self.backend.flush_metadata(self.now)
    }

    /// Snapshot of the counters, including bus figures.
    pub fn stats(&self) -> SecStats {
        let mut stats = self.backend.stats().clone();
        let buses = self.backend.interconnect();
        stats.cycles = self.now;
        stats.meta_bus_transfers = buses.meta_bus.transfers();
        stats.mem_bus_transfers = buses.mem_bus.transfers();
        stats.bus_wait_cycles = buses.meta_bus.wait_cycles() + buses.mem_bus.wait_cycles();
        stats.meta_evictions = self.backend.store().cache().evictions();
        (stats.dram_row_hits, stats.dram_row_misses) = self.backend.memory().row_buffer_stats();
        stats
    }

    /// The metadata store (cache contents, root, line instrumentation).
    pub const fn store(&self) -> &MetadataStore {
        self.backend.store()
    }

    /// The downstream resources.
    pub const fn backend(&self) -> &Backend {
        &self.backend
    }

    /// The dispatcher.
    pub const fn sec_ctrl(&self) -> &SecCtrl<ReadCtrl, WriteCtrl> {
        &self.sec_ctrl
    }
}
