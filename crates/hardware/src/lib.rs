//! Secure memory controller model.
//!
//! This crate implements a cycle-level model of an encrypted, integrity-protected memory
//! with the following:
//! 1. **Security Controller:** Validates and dispatches requests to a read path and a
//!    write path, with back-pressure and retry signalling.
//! 2. **Schemes:** Counter-tree (CT) and Merkle-tree (MT) write paths; MT writes data
//!    over a bypass port concurrently with the metadata update.
//! 3. **Metadata:** A MAC region, a counter region and an integrity tree rooted on chip,
//!    walked through a set-associative metadata cache with per-line serialization.
//! 4. **Memory side:** Main memory with simple or DRAM row-buffer timing, and buses.
//! 5. **Simulation:** Configuration, workload loading, the run driver and statistics.

/// Common types and constants (addresses, packets, errors).
pub mod common;
/// Simulator configuration (defaults, enums, hierarchical config structures).
pub mod config;
/// Security controller, read and write paths, metadata store and crypto.
pub mod secure;
/// Timed queues, workload loading and the run driver.
pub mod sim;
/// Memory-side components and the `SecureMemory` builder.
pub mod soc;
/// Simulation statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Errors and request/response packets.
pub use crate::common::{MemRequest, MemResponse, SecError};
/// Top-level secure memory; construct with `SecureMemory::new`.
pub use crate::soc::SecureMemory;
