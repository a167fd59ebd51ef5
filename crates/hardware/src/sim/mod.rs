//! Simulation infrastructure.
//!
//! Provides the timed queue that models fixed latencies, workload loading and
//! generation, and the driver that feeds a workload through a `SecureMemory`.

/// Timed completion queue.
pub mod event;

/// Workload files and synthetic workload generation.
pub mod loader;

/// Cycle-by-cycle workload driver.
pub mod simulator;

pub use simulator::{RunSummary, Simulator};
