//! Global Layout and Timing Constants.
//!
//! This module defines system-wide constants used across the secure memory model. It includes:
//! 1. **Block Constants:** Data block size, shift and mask for protected-region addressing.
//! 2. **Line Constants:** Metadata line size and slot geometry (eight 8-byte slots per line).
//! 3. **Tree Constants:** Fan-out of the integrity tree and the deepest supported tree.
//! 4. **Simulation Constants:** Thresholds used by the cycle-driven simulator.

/// Size of a protected data block in bytes.
///
/// Every request is confined to one block; counters and MACs are kept per block.
pub const BLOCK_BYTES: u64 = 64;

/// Number of bits to shift to convert between byte addresses and block indices.
pub const BLOCK_SHIFT: u32 = 6;

/// Mask for extracting the byte offset within a block.
pub const BLOCK_OFFSET_MASK: u64 = BLOCK_BYTES - 1;

/// Size of a metadata line (MAC line, counter line or tree node) in bytes.
pub const LINE_BYTES: usize = 64;

/// Size of one metadata slot (a MAC, a counter or a child tag) in bytes.
pub const SLOT_BYTES: u64 = 8;

/// Number of slots held by a single metadata line.
pub const SLOTS_PER_LINE: u64 = LINE_BYTES as u64 / SLOT_BYTES;

/// Fan-out of the integrity tree: each node carries the tags of eight children.
pub const TREE_ARITY: u64 = 8;

/// Smallest protected region accepted by the layout (one page).
pub const MIN_PROTECTED_BYTES: u64 = 4096;

/// Deepest tree the layout will build. A 64-bit region never needs more levels.
pub const MAX_TREE_LEVELS: usize = 24;

/// Number of cycles between progress messages emitted by the simulator.
pub const STATUS_UPDATE_INTERVAL: u64 = 1_000_000;

/// Cycles the simulator tolerates without any completed response before it reports a stall.
pub const HANG_DETECTION_THRESHOLD: u64 = 100_000;
