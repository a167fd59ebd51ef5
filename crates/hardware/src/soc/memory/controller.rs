//! Memory controller implementations for latency modeling.
//!
//! This module provides:
//! 1. **SimpleController:** Fixed latency per access (no row-buffer modeling).
//! 2. **DramController:** Row-buffer-aware latency (CAS, RAS, precharge) for DRAM-style timing.
//!
//! Data blocks and metadata lines share the same controller, so metadata misses and
//! data accesses disturb each other's open rows just as they would on real hardware.

use crate::config::{MemoryConfig, MemoryController as ControllerKind};

/// Trait for memory controller implementations that report access latency in cycles.
pub trait MemoryController: Send + Sync {
    /// Returns the number of cycles required for an access to the given address.
    ///
    /// # Arguments
    ///
    /// * `addr` - Physical address being accessed (may be used for row-buffer modeling).
    ///
    /// # Returns
    ///
    /// Latency in simulation cycles.
    fn access_latency(&mut self, addr: u64) -> u64;

    /// Row-buffer hits and misses so far; zero for models without a row buffer.
    fn row_buffer_stats(&self) -> (u64, u64) {
        (0, 0)
    }
}

/// Builds the controller selected by `config.controller`.
pub fn from_config(config: &MemoryConfig) -> Box<dyn MemoryController + Send + Sync> {
    match config.controller {
        ControllerKind::Simple => Box::new(SimpleController::new(config.latency)),
        ControllerKind::Dram => Box::new(
            DramController::new(config.t_cas, config.t_ras, config.t_pre)
                .with_row_bytes(config.row_bytes),
        ),
    }
}

/// Fixed-latency memory controller; every access takes the same number of cycles.
#[derive(Debug)]
pub struct SimpleController {
    latency: u64,
}

impl SimpleController {
    /// Creates a simple controller with the given fixed latency in cycles.
    pub const fn new(latency: u64) -> Self {
        Self { latency }
    }
}

impl MemoryController for SimpleController {
    fn access_latency(&mut self, _addr: u64) -> u64 {
        self.latency
    }
}

/// DRAM-style controller with one open row; models CAS, RAS, and precharge latencies.
#[derive(Debug)]
pub struct DramController {
    last_row: Option<u64>,
    t_cas: u64,
    t_ras: u64,
    t_pre: u64,
    row_mask: u64,
    row_hits: u64,
    row_misses: u64,
}

impl DramController {
    /// Creates a DRAM controller with the given timing parameters (in cycles).
    ///
    /// # Arguments
    ///
    /// * `t_cas` - Column access strobe latency.
    /// * `t_ras` - Row access strobe latency.
    /// * `t_pre` - Precharge latency.
    ///
    /// # Returns
    ///
    /// A new `DramController` with 2 KiB rows and no row currently open.
    pub const fn new(t_cas: u64, t_ras: u64, t_pre: u64) -> Self {
        Self {
            last_row: None,
            t_cas,
            t_ras,
            t_pre,
            row_mask: !2047,
            row_hits: 0,
            row_misses: 0,
        }
    }

    /// Sets the row size (a power of two, in bytes).
    #[must_use]
    pub const fn with_row_bytes(mut self, row_bytes: u64) -> Self {
        self.row_mask = !(row_bytes.saturating_sub(1));
        self
    }

    /// Accesses that found their row open.
    pub const fn row_hits(&self) -> u64 {
        self.row_hits
    }

    /// Accesses that had to open a row.
    pub const fn row_misses(&self) -> u64 {
        self.row_misses
    }
}

impl MemoryController for DramController {
    fn access_latency(&mut self, addr: u64) -> u64 {
        let row = addr & self.row_mask;
        match self.last_row {
            Some(open_row) if open_row == row => {
                self.row_hits += 1;
                self.t_cas
            }
            Some(_) => {
                self.row_misses += 1;
                self.last_row = Some(row);
                self.t_pre + self.t_ras + self.t_cas
            }
            None => {
                self.row_misses += 1;
                self.last_row = Some(row);
                self.t_ras + self.t_cas
            }
        }
    }

    fn row_buffer_stats(&self) -> (u64, u64) {
        (self.row_hits, self.row_misses)
    }
}
