//! Configuration system for the secure memory model.
//!
//! This module defines all configuration structures and enums used to parameterize
//! the simulator. It provides:
//! 1. **Defaults:** Baseline hardware constants (protected region, metadata cache, buses, DRAM).
//! 2. **Structures:** Hierarchical config for general, layout, cache, memory, bus, controller and crypto.
//! 3. **Enums:** Protection scheme, memory controller and replacement policy types.
//! 4. **Validation:** `Config::validate` rejects geometry the model cannot build.
//!
//! Configuration is supplied as JSON (CLI `--config`) or built with `Config::default()`.
//! It is immutable for the duration of a run.

use serde::{Deserialize, Serialize};

use crate::common::SecError;
use crate::common::constants::{LINE_BYTES, MIN_PROTECTED_BYTES};

/// Default configuration constants for the simulator.
///
/// These values define the baseline hardware configuration when not
/// explicitly overridden in JSON configuration files.
mod defaults {
    /// Size of the protected data region (1 GiB).
    ///
    /// Metadata regions are laid out immediately above it.
    pub const PROTECTED_BYTES: u64 = 1 << 30;

    /// Metadata cache capacity in bytes (128 KiB).
    pub const META_CACHE_SIZE: usize = 128 * 1024;

    /// Metadata cache associativity.
    pub const META_CACHE_WAYS: usize = 4;

    /// Metadata cache probe latency in cycles.
    pub const META_CACHE_LATENCY: u64 = 2;

    /// Concurrent metadata misses the cache can have outstanding.
    pub const META_CACHE_MSHRS: usize = 4;

    /// Fixed main-memory latency for the simple controller.
    pub const MEM_LATENCY: u64 = 100;

    /// CAS (Column Access Strobe) latency in DRAM cycles.
    pub const T_CAS: u64 = 14;

    /// RAS (Row Access Strobe) latency in DRAM cycles.
    pub const T_RAS: u64 = 14;

    /// Precharge latency in DRAM cycles.
    pub const T_PRE: u64 = 14;

    /// DRAM row size in bytes.
    pub const ROW_BYTES: u64 = 2048;

    /// Metadata bus width in bytes.
    pub const META_BUS_WIDTH: u64 = 16;

    /// Metadata bus base latency in cycles.
    pub const META_BUS_LATENCY: u64 = 4;

    /// Memory (bypass) bus width in bytes.
    pub const MEM_BUS_WIDTH: u64 = 16;

    /// Memory (bypass) bus base latency in cycles.
    pub const MEM_BUS_LATENCY: u64 = 4;

    /// Read controller pending-table capacity.
    pub const READ_QUEUE: usize = 16;

    /// Write controller pending-table capacity.
    pub const WRITE_QUEUE: usize = 16;

    /// Upstream response queue capacity.
    pub const RESPONSE_QUEUE: usize = 16;

    /// Data port in-flight capacity.
    pub const PORT_QUEUE: usize = 32;

    /// Concurrently active metadata store operations.
    pub const STORE_OPS: usize = 32;

    /// Latency of one hash/MAC/encryption computation in cycles.
    pub const HASH_CYCLES: u64 = 40;

    /// Seed the engine key is derived from.
    pub const KEY_SEED: u64 = 0x6361_6368_6574;

    /// Cycle budget for a simulation run.
    pub const MAX_CYCLES: u64 = 50_000_000;
}

/// Integrity protection scheme.
///
/// Selects the write-path variant and the port topology built by the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum Scheme {
    /// Counter tree: metadata commits strictly before data, all traffic on the metadata bus.
    #[default]
    #[serde(alias = "CT", alias = "ct")]
    Ct,
    /// Merkle tree: metadata update and data write proceed concurrently, data over the bypass bus.
    #[serde(alias = "MT", alias = "mt")]
    Mt,
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ct => write!(f, "CT"),
            Self::Mt => write!(f, "MT"),
        }
    }
}

/// Memory controller implementation types.
///
/// Specifies the latency model used for main-memory accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum MemoryController {
    /// Every access takes `memory.latency` cycles.
    #[default]
    Simple,
    /// Row-buffer model using `t_cas`, `t_ras` and `t_pre`.
    #[serde(alias = "DRAM")]
    Dram,
}

/// Metadata cache replacement policy algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplacementPolicy {
    /// Least Recently Used replacement policy.
    #[default]
    #[serde(alias = "Lru")]
    Lru,
    /// Pseudo-LRU replacement policy.
    #[serde(alias = "Plru")]
    Plru,
    /// Most Recently Used replacement policy.
    #[serde(alias = "Mru")]
    Mru,
    /// First In First Out replacement policy.
    #[serde(alias = "Fifo")]
    Fifo,
    /// Random replacement policy.
    #[serde(alias = "Random")]
    Random,
}

/// Root configuration structure containing all simulator settings.
///
/// # Examples
///
/// Creating a default configuration:
///
/// ```
/// use cachet_core::config::{Config, Scheme};
///
/// let config = Config::default();
/// assert_eq!(config.scheme, Scheme::Ct);
/// assert_eq!(config.meta_cache.size_bytes, 128 * 1024);
/// assert!(config.validate().is_ok());
/// ```
///
/// Deserializing from JSON, omitted fields take their defaults:
///
/// ```
/// use cachet_core::config::{Config, MemoryController, Scheme};
///
/// let json = r#"{
///     "scheme": "MT",
///     "layout": { "protected_bytes": 1048576 },
///     "meta_cache": { "size_bytes": 8192, "ways": 2 },
///     "memory": { "controller": "Dram" }
/// }"#;
///
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.scheme, Scheme::Mt);
/// assert_eq!(config.memory.controller, MemoryController::Dram);
/// assert_eq!(config.crypto.hash_cycles, 40);
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// General simulation settings
    pub general: GeneralConfig,
    /// Protection scheme (CT or MT)
    pub scheme: Scheme,
    /// Protected region and metadata layout
    pub layout: LayoutConfig,
    /// Metadata cache geometry
    pub meta_cache: MetaCacheConfig,
    /// Main memory latency model
    pub memory: MemoryConfig,
    /// Metadata and memory bus parameters
    pub bus: BusConfig,
    /// Controller queue capacities
    pub controller: ControllerConfig,
    /// Crypto engine parameters
    pub crypto: CryptoConfig,
}

impl Config {
    /// Parses a configuration from a JSON string and validates it.
    ///
    /// # Arguments
    ///
    /// * `json` - JSON text; missing sections and fields take their defaults.
    ///
    /// # Returns
    ///
    /// The validated configuration, or `SecError::Config` describing the problem.
    pub fn from_json(json: &str) -> Result<Self, SecError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SecError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration describes a buildable system.
    ///
    /// # Returns
    ///
    /// `Ok(())`, or `SecError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<(), SecError> {
        let bad = |msg: String| Err(SecError::Config(msg));

        let protected = self.layout.protected_bytes;
        if protected < MIN_PROTECTED_BYTES || !protected.is_power_of_two() {
            return bad(format!(
                "layout.protected_bytes must be a power of two >= {MIN_PROTECTED_BYTES}, got {protected}"
            ));
        }

        let cache = &self.meta_cache;
        if cache.ways == 0 {
            return bad("meta_cache.ways must be at least 1".into());
        }
        if cache.size_bytes == 0 || cache.size_bytes % (LINE_BYTES * cache.ways) != 0 {
            return bad(format!(
                "meta_cache.size_bytes ({}) must be a non-zero multiple of {} x ways ({})",
                cache.size_bytes, LINE_BYTES, cache.ways
            ));
        }
        if cache.latency == 0 {
            return bad("meta_cache.latency must be at least 1 cycle".into());
        }
        if cache.mshrs == 0 {
            return bad("meta_cache.mshrs must be at least 1".into());
        }

        if self.bus.meta_bus_width == 0 || self.bus.mem_bus_width == 0 {
            return bad("bus widths must be non-zero".into());
        }

        let ctrl = &self.controller;
        for (name, value) in [
            ("read_queue", ctrl.read_queue),
            ("write_queue", ctrl.write_queue),
            ("response_queue", ctrl.response_queue),
            ("port_queue", ctrl.port_queue),
            ("store_ops", ctrl.store_ops),
        ] {
            if value == 0 {
                return bad(format!("controller.{name} must be at least 1"));
            }
        }

        if self.memory.controller == MemoryController::Dram
            && !self.memory.row_bytes.is_power_of_two()
        {
            return bad("memory.row_bytes must be a power of two".into());
        }

        Ok(())
    }
}

/// General simulation settings and options.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    /// Cycle budget; the simulator stops with an error when it is exhausted.
    #[serde(default = "GeneralConfig::default_max_cycles")]
    pub max_cycles: u64,

    /// Emit per-request trace events (also needs a `trace` log filter).
    #[serde(default)]
    pub trace: bool,
}

impl GeneralConfig {
    /// Returns the default cycle budget.
    const fn default_max_cycles() -> u64 {
        defaults::MAX_CYCLES
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            max_cycles: defaults::MAX_CYCLES,
            trace: false,
        }
    }
}

/// Protected region size; the metadata layout is derived from it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LayoutConfig {
    /// Bytes of protected data starting at address 0 (power of two, >= 4 KiB).
    #[serde(default = "LayoutConfig::default_protected_bytes")]
    pub protected_bytes: u64,
}

impl LayoutConfig {
    /// Returns the default protected region size.
    const fn default_protected_bytes() -> u64 {
        defaults::PROTECTED_BYTES
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            protected_bytes: defaults::PROTECTED_BYTES,
        }
    }
}

/// Metadata cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetaCacheConfig {
    /// Capacity in bytes
    #[serde(default = "MetaCacheConfig::default_size")]
    pub size_bytes: usize,

    /// Associativity
    #[serde(default = "MetaCacheConfig::default_ways")]
    pub ways: usize,

    /// Probe latency in cycles
    #[serde(default = "MetaCacheConfig::default_latency")]
    pub latency: u64,

    /// Replacement policy
    #[serde(default)]
    pub policy: ReplacementPolicy,

    /// Misses that may be outstanding to memory at once
    #[serde(default = "MetaCacheConfig::default_mshrs")]
    pub mshrs: usize,
}

impl MetaCacheConfig {
    /// Returns the default metadata cache capacity.
    const fn default_size() -> usize {
        defaults::META_CACHE_SIZE
    }

    /// Returns the default metadata cache associativity.
    const fn default_ways() -> usize {
        defaults::META_CACHE_WAYS
    }

    /// Returns the default metadata cache probe latency.
    const fn default_latency() -> u64 {
        defaults::META_CACHE_LATENCY
    }

    /// Returns the default number of miss-status holding registers.
    const fn default_mshrs() -> usize {
        defaults::META_CACHE_MSHRS
    }
}

impl Default for MetaCacheConfig {
    fn default() -> Self {
        Self {
            size_bytes: defaults::META_CACHE_SIZE,
            ways: defaults::META_CACHE_WAYS,
            latency: defaults::META_CACHE_LATENCY,
            policy: ReplacementPolicy::default(),
            mshrs: defaults::META_CACHE_MSHRS,
        }
    }
}

/// Main memory latency configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemoryConfig {
    /// Memory controller type
    #[serde(default)]
    pub controller: MemoryController,

    /// Fixed access latency (simple controller)
    #[serde(default = "MemoryConfig::default_latency")]
    pub latency: u64,

    /// CAS latency (column access strobe)
    #[serde(default = "MemoryConfig::default_t_cas")]
    pub t_cas: u64,

    /// RAS latency (row access strobe)
    #[serde(default = "MemoryConfig::default_t_ras")]
    pub t_ras: u64,

    /// Precharge latency
    #[serde(default = "MemoryConfig::default_t_pre")]
    pub t_pre: u64,

    /// DRAM row size in bytes
    #[serde(default = "MemoryConfig::default_row_bytes")]
    pub row_bytes: u64,
}

impl MemoryConfig {
    /// Returns the default fixed memory latency.
    const fn default_latency() -> u64 {
        defaults::MEM_LATENCY
    }

    /// Returns the default CAS latency.
    const fn default_t_cas() -> u64 {
        defaults::T_CAS
    }

    /// Returns the default RAS latency.
    const fn default_t_ras() -> u64 {
        defaults::T_RAS
    }

    /// Returns the default precharge latency.
    const fn default_t_pre() -> u64 {
        defaults::T_PRE
    }

    /// Returns the default DRAM row size.
    const fn default_row_bytes() -> u64 {
        defaults::ROW_BYTES
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            controller: MemoryController::default(),
            latency: defaults::MEM_LATENCY,
            t_cas: defaults::T_CAS,
            t_ras: defaults::T_RAS,
            t_pre: defaults::T_PRE,
            row_bytes: defaults::ROW_BYTES,
        }
    }
}

/// Bus parameters for the metadata bus and the memory (bypass) bus.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BusConfig {
    /// Metadata bus width in bytes
    #[serde(default = "BusConfig::default_meta_width")]
    pub meta_bus_width: u64,

    /// Metadata bus base latency in cycles
    #[serde(default = "BusConfig::default_meta_latency")]
    pub meta_bus_latency: u64,

    /// Memory bus width in bytes
    #[serde(default = "BusConfig::default_mem_width")]
    pub mem_bus_width: u64,

    /// Memory bus base latency in cycles
    #[serde(default = "BusConfig::default_mem_latency")]
    pub mem_bus_latency: u64,
}

impl BusConfig {
    /// Returns the default metadata bus width.
    const fn default_meta_width() -> u64 {
        defaults::META_BUS_WIDTH
    }

    /// Returns the default metadata bus latency.
    const fn default_meta_latency() -> u64 {
        defaults::META_BUS_LATENCY
    }

    /// Returns the default memory bus width.
    const fn default_mem_width() -> u64 {
        defaults::MEM_BUS_WIDTH
    }

    /// Returns the default memory bus latency.
    const fn default_mem_latency() -> u64 {
        defaults::MEM_BUS_LATENCY
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            meta_bus_width: defaults::META_BUS_WIDTH,
            meta_bus_latency: defaults::META_BUS_LATENCY,
            mem_bus_width: defaults::MEM_BUS_WIDTH,
            mem_bus_latency: defaults::MEM_BUS_LATENCY,
        }
    }
}

/// Capacities of the bounded queues and tables inside the controller.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Pending-request table entries in the read controller
    #[serde(default = "ControllerConfig::default_read_queue")]
    pub read_queue: usize,

    /// Pending-request table entries in the write controller
    #[serde(default = "ControllerConfig::default_write_queue")]
    pub write_queue: usize,

    /// Responses the security controller can hold for the upstream side
    #[serde(default = "ControllerConfig::default_response_queue")]
    pub response_queue: usize,

    /// Data accesses each memory-side port can have in flight
    #[serde(default = "ControllerConfig::default_port_queue")]
    pub port_queue: usize,

    /// Concurrently active metadata store operations
    #[serde(default = "ControllerConfig::default_store_ops")]
    pub store_ops: usize,
}

impl ControllerConfig {
    /// Returns the default read table capacity.
    const fn default_read_queue() -> usize {
        defaults::READ_QUEUE
    }

    /// Returns the default write table capacity.
    const fn default_write_queue() -> usize {
        defaults::WRITE_QUEUE
    }

    /// Returns the default upstream response queue capacity.
    const fn default_response_queue() -> usize {
        defaults::RESPONSE_QUEUE
    }

    /// Returns the default data port capacity.
    const fn default_port_queue() -> usize {
        defaults::PORT_QUEUE
    }

    /// Returns the default store operation limit.
    const fn default_store_ops() -> usize {
        defaults::STORE_OPS
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            read_queue: defaults::READ_QUEUE,
            write_queue: defaults::WRITE_QUEUE,
            response_queue: defaults::RESPONSE_QUEUE,
            port_queue: defaults::PORT_QUEUE,
            store_ops: defaults::STORE_OPS,
        }
    }
}

/// Crypto engine parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CryptoConfig {
    /// Latency of one hash, MAC or keystream computation
    #[serde(default = "CryptoConfig::default_hash_cycles")]
    pub hash_cycles: u64,

    /// Seed for the engine key
    #[serde(default = "CryptoConfig::default_key_seed")]
    pub key_seed: u64,
}

impl CryptoConfig {
    /// Returns the default hash latency.
    const fn default_hash_cycles() -> u64 {
        defaults::HASH_CYCLES
    }

    /// Returns the default key seed.
    const fn default_key_seed() -> u64 {
        defaults::KEY_SEED
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            hash_cycles: defaults::HASH_CYCLES,
            key_seed: defaults::KEY_SEED,
        }
    }
}
