//! Memory-side components.
//!
//! This module organizes everything behind the security controller: the metadata and
//! memory buses, main memory with its latency models and data ports, the metadata cache,
//! and the builder that assembles a complete `SecureMemory`.

/// Scheme assembly and the top-level `SecureMemory`.
pub mod builder;

/// Metadata and memory buses.
pub mod interconnect;

/// Main memory, latency models and data ports.
pub mod memory;

/// Set-associative metadata cache.
pub mod meta_cache;

pub use builder::{SecureMemory, Topology};
