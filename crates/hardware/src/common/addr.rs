//! Data and Metadata Address types.
//!
//! This module defines strong types for the two address spaces the secure memory model
//! juggles, so a data address is never used where a metadata line is expected. It provides:
//! 1. **Type Safety:** Distinguishes protected data addresses from metadata line addresses.
//! 2. **Block Arithmetic:** Block index, block base and in-block offset helpers.
//! 3. **Slot Arithmetic:** Locating an 8-byte slot inside a 64-byte metadata line.

use std::fmt;

use super::constants::{BLOCK_OFFSET_MASK, BLOCK_SHIFT, SLOT_BYTES};

/// A byte address inside the protected data region.
///
/// Requests from the processor side carry this type; it is never used to index the
/// metadata regions directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PhysAddr(pub u64);

/// The base address of a 64-byte metadata line (MAC line, counter line or tree node).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineAddr(pub u64);

/// A single 8-byte slot inside a metadata line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotRef {
    /// Line holding the slot.
    pub line: LineAddr,
    /// Slot index within the line (0..8).
    pub slot: usize,
}

impl PhysAddr {
    /// Creates a new data address from a raw 64-bit value.
    ///
    /// # Arguments
    ///
    /// * `addr` - The raw 64-bit address value.
    ///
    /// # Returns
    ///
    /// A new `PhysAddr` instance wrapping the provided address.
    #[inline(always)]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw 64-bit address value.
    #[inline(always)]
    pub const fn val(&self) -> u64 {
        self.0
    }

    /// Returns the index of the 64-byte block containing this address.
    #[inline(always)]
    pub const fn block(&self) -> u64 {
        self.0 >> BLOCK_SHIFT
    }

    /// Returns the address of the first byte of the containing block.
    #[inline(always)]
    pub const fn block_base(&self) -> Self {
        Self(self.0 & !BLOCK_OFFSET_MASK)
    }

    /// Returns the byte offset within the containing block.
    #[inline(always)]
    pub const fn block_offset(&self) -> usize {
        (self.0 & BLOCK_OFFSET_MASK) as usize
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl LineAddr {
    /// Creates a new line address from a raw 64-bit value.
    #[inline(always)]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw 64-bit address value.
    #[inline(always)]
    pub const fn val(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LineAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl SlotRef {
    /// Reads the slot value out of a line image (little-endian).
    ///
    /// # Arguments
    ///
    /// * `line` - The 64-byte contents of `self.line`.
    ///
    /// # Returns
    ///
    /// The 64-bit value stored in the slot.
    pub fn read(&self, line: &[u8; 64]) -> u64 {
        read_slot(line, self.slot)
    }

    /// Writes a value into the slot of a line image (little-endian).
    pub fn write(&self, line: &mut [u8; 64], value: u64) {
        write_slot(line, self.slot, value);
    }

    /// Returns the byte address of the slot in metadata space.
    pub const fn byte_addr(&self) -> u64 {
        self.line.0 + self.slot as u64 * SLOT_BYTES
    }
}

/// Reads slot `slot` of a line image as a little-endian `u64`.
pub fn read_slot(line: &[u8; 64], slot: usize) -> u64 {
    let start = slot * SLOT_BYTES as usize;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&line[start..start + SLOT_BYTES as usize]);
    u64::from_le_bytes(bytes)
}

/// Writes `value` into slot `slot` of a line image as little-endian bytes.
pub fn write_slot(line: &mut [u8; 64], slot: usize, value: u64) {
    let start = slot * SLOT_BYTES as usize;
    line[start..start + SLOT_BYTES as usize].copy_from_slice(&value.to_le_bytes());
}
