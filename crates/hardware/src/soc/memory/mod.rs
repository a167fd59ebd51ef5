//! Main memory behind the secure controller.
//!
//! This module implements the untrusted off-chip memory. It provides:
//! 1. **Backing store:** Sparse 64-byte lines for the data region and all metadata regions.
//! 2. **Controller:** Latency modeling (simple or DRAM row-buffer) for timing simulation.
//! 3. **Ports:** Bounded timed ports that move data blocks over a bus.
//!
//! Lines never written read back as zeros, which is the pristine state of both data
//! and metadata. Everything stored here is untrusted: the tamper hooks flip bits in it.

/// Memory controller implementations for access latency modeling.
pub mod controller;

/// Timed data ports (metadata-bus path and bypass path).
pub mod port;

use std::collections::HashMap;
use std::fmt;

use self::controller::MemoryController;
use crate::common::Block;
use crate::common::constants::LINE_BYTES;

/// Off-chip memory: sparse line storage plus a latency model.
pub struct MainMemory {
    lines: HashMap<u64, Block>,
    controller: Box<dyn MemoryController + Send + Sync>,
    reads: u64,
    writes: u64,
}

impl fmt::Debug for MainMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainMemory")
            .field("resident_lines", &self.lines.len())
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .finish_non_exhaustive()
    }
}

impl MainMemory {
    /// Creates an empty memory using `controller` for timing.
    pub fn new(controller: Box<dyn MemoryController + Send + Sync>) -> Self {
        Self {
            lines: HashMap::new(),
            controller,
            reads: 0,
            writes: 0,
        }
    }

    /// Returns the latency of an access to `addr` and records it with the controller.
    pub fn access_latency(&mut self, addr: u64) -> u64 {
        self.controller.access_latency(addr)
    }

    /// Row-buffer hits and misses reported by the latency model.
    pub fn row_buffer_stats(&self) -> (u64, u64) {
        self.controller.row_buffer_stats()
    }

    /// Reads the line containing `addr`; unwritten lines are all zero.
    pub fn read_line(&mut self, addr: u64) -> Block {
        self.reads += 1;
        self.peek_line(addr)
    }

    /// Reads a line without counting it as a memory access.
    pub fn peek_line(&self, addr: u64) -> Block {
        self.lines
            .get(&Self::align(addr))
            .copied()
            .unwrap_or([0u8; LINE_BYTES])
    }

    /// Writes the line containing `addr`.
    pub fn write_line(&mut self, addr: u64, data: Block) {
        self.writes += 1;
        let _ = self.lines.insert(Self::align(addr), data);
    }

    /// XORs `mask` into the byte at `addr` without going through the controller.
    ///
    /// Models an attacker modifying off-chip memory.
    pub fn corrupt(&mut self, addr: u64, mask: u8) {
        let line = self.lines.entry(Self::align(addr)).or_insert([0u8; LINE_BYTES]);
        line[(addr % LINE_BYTES as u64) as usize] ^= mask;
    }

    /// Line reads performed so far.
    pub const fn reads(&self) -> u64 {
        self.reads
    }

    /// Line writes performed so far.
    pub const fn writes(&self) -> u64 {
        self.writes
    }

    /// Number of lines that have ever been written.
    pub fn resident_lines(&self) -> usize {
        self.lines.len()
    }

    const fn align(addr: u64) -> u64 {
        addr & !(LINE_BYTES as u64 - 1)
    }
}
