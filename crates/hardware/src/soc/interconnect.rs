//! Metadata and memory buses.
//!
//! This module models the two buses between the secure controller and main memory. It provides:
//! 1. **Transit time:** Base latency plus one beat per `width_bytes` of payload.
//! 2. **Occupancy:** A bus carries one transfer at a time; later transfers queue behind it.
//! 3. **Routing:** `Interconnect` names the metadata bus and the memory (bypass) bus.

use std::fmt;

use crate::common::Cycle;
use crate::config::BusConfig;

/// Which bus a port is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BusId {
    /// Bus carrying metadata traffic (and, for CT, all data traffic).
    Meta,
    /// Bus to the memory controller used by the MT write bypass.
    Mem,
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Meta => write!(f, "meta_bus"),
            Self::Mem => write!(f, "mem_bus"),
        }
    }
}

/// A single bus with fixed width, base latency and one transfer in flight at a time.
#[derive(Clone, Debug)]
pub struct Bus {
    /// Bus width in bytes; used to compute transfer beats.
    pub width_bytes: u64,
    /// Base latency in cycles per transaction.
    pub latency_cycles: u64,
    busy_until: Cycle,
    transfers: u64,
    wait_cycles: u64,
}

impl Bus {
    /// Creates a new idle bus with the given width and latency.
    ///
    /// # Arguments
    ///
    /// * `width_bytes` - Transfer width in bytes (e.g., 16).
    /// * `latency_cycles` - Base cycles per transaction.
    pub fn new(width_bytes: u64, latency_cycles: u64) -> Self {
        Self {
            width_bytes: width_bytes.max(1),
            latency_cycles,
            busy_until: 0,
            transfers: 0,
            wait_cycles: 0,
        }
    }

    /// Returns the number of cycles to transfer the given number of bytes on an idle bus.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Number of bytes to transfer.
    ///
    /// # Returns
    ///
    /// Cycles = base latency plus ceiling(bytes / width_bytes) beats.
    pub fn calculate_transit_time(&self, bytes: usize) -> u64 {
        self.latency_cycles + self.beats(bytes)
    }

    fn beats(&self, bytes: usize) -> u64 {
        (bytes as u64).div_ceil(self.width_bytes)
    }

    /// Reserves the bus for a transfer issued at `now`.
    ///
    /// The transfer starts once earlier transfers have left the bus and occupies it for
    /// its beats.
    ///
    /// # Returns
    ///
    /// Cycles from `now` until the transfer has arrived (queueing plus transit).
    pub fn reserve(&mut self, now: Cycle, bytes: usize) -> u64 {
        let start = now.max(self.busy_until);
        let beats = self.beats(bytes);
        self.busy_until = start + beats;
        self.transfers += 1;
        self.wait_cycles += start - now;
        (start - now) + self.latency_cycles + beats
    }

    /// Number of transfers carried so far.
    pub const fn transfers(&self) -> u64 {
        self.transfers
    }

    /// Total cycles transfers spent waiting for the bus.
    pub const fn wait_cycles(&self) -> u64 {
        self.wait_cycles
    }
}

/// The pair of buses behind the secure controller.
#[derive(Clone, Debug)]
pub struct Interconnect {
    /// Metadata bus.
    pub meta_bus: Bus,
    /// Memory (bypass) bus.
    pub mem_bus: Bus,
}

impl Interconnect {
    /// Builds both buses from configuration.
    pub fn new(config: &BusConfig) -> Self {
        Self {
            meta_bus: Bus::new(config.meta_bus_width, config.meta_bus_latency),
            mem_bus: Bus::new(config.mem_bus_width, config.mem_bus_latency),
        }
    }

    /// Returns the bus with the given identity.
    pub const fn bus_mut(&mut self, id: BusId) -> &mut Bus {
        match id {
            BusId::Meta => &mut self.meta_bus,
            BusId::Mem => &mut self.mem_bus,
        }
    }

    /// Returns the bus with the given identity.
    pub const fn bus(&self, id: BusId) -> &Bus {
        match id {
            BusId::Meta => &self.meta_bus,
            BusId::Mem => &self.mem_bus,
        }
    }
}
