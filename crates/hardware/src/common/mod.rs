//! Common utilities and types used throughout the secure memory model.
//!
//! This module provides fundamental building blocks that are shared across all components
//! of the simulator. It includes:
//! 1. **Address Types:** Strong types for data addresses, metadata lines and slots.
//! 2. **Constants:** Block, line and tree geometry plus simulation thresholds.
//! 3. **Packets:** Memory requests, responses and their outcomes.
//! 4. **Error Handling:** The `SecError` taxonomy and the `Rejected` wrapper.

/// Address type definitions (data addresses, metadata lines, slots).
pub mod addr;

/// Common constants used throughout the simulator.
pub mod constants;

/// Request and response packet definitions.
pub mod data;

/// Error types.
pub mod error;

pub use addr::{LineAddr, PhysAddr, SlotRef};
pub use constants::{BLOCK_BYTES, LINE_BYTES};
pub use data::{Block, Cycle, Direction, MemRequest, MemResponse, Outcome, ProtectedUnit, RequestId};
pub use error::{Rejected, SecError};
