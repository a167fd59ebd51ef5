//! Workload Loading and Generation.
//!
//! This module turns workload descriptions into request streams. It performs:
//! 1. **Parsing:** Reads a JSON array of `{"op": "read" | "write", ...}` records.
//! 2. **Loading:** Reads and parses a workload file from disk.
//! 3. **Generation:** Builds synthetic sequential, random and write-then-read streams
//!    confined to the protected region.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::MemRequest;
use crate::common::constants::BLOCK_BYTES;

/// Default access size of a workload read.
const fn default_size() -> usize {
    BLOCK_BYTES as usize
}

/// One operation of a workload file.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum WorkloadOp {
    /// Read `size` bytes at `addr`.
    Read {
        /// Byte address.
        addr: u64,
        /// Bytes to read.
        #[serde(default = "default_size")]
        size: usize,
    },
    /// Write `data` at `addr`.
    Write {
        /// Byte address.
        addr: u64,
        /// Bytes to write.
        data: Vec<u8>,
        /// No response is expected when set.
        #[serde(default)]
        posted: bool,
    },
}

impl WorkloadOp {
    /// Converts the operation into a request with identifier `id`.
    pub fn to_request(&self, id: u64) -> MemRequest {
        match self {
            Self::Read { addr, size } => MemRequest::read(id, *addr, *size),
            Self::Write { addr, data, posted } => {
                let request = MemRequest::write(id, *addr, data.clone());
                if *posted { request.posted() } else { request }
            }
        }
    }
}

/// Errors raised while loading a workload file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be read.
    #[error("cannot read workload {}: {source}", .path.display())]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not a valid workload.
    #[error("malformed workload: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Parses a JSON workload.
pub fn parse_workload(json: &str) -> Result<Vec<WorkloadOp>, LoadError> {
    Ok(serde_json::from_str(json)?)
}

/// Reads and parses a JSON workload file.
///
/// # Arguments
///
/// * `path` - Path to a file holding a JSON array of operations.
///
/// # Returns
///
/// The operations in file order, or a `LoadError`.
pub fn load_workload(path: &Path) -> Result<Vec<WorkloadOp>, LoadError> {
    let json = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_workload(&json)
}

/// Shape of a generated workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pattern {
    /// Alternating full-block writes and reads walking the region block by block.
    Sequential,
    /// Uniformly random blocks, one write in four, random partial sizes.
    Random,
    /// Every block written once, then read back in the same order.
    WriteThenRead,
}

/// xorshift64, the generator the random replacement policy uses.
#[derive(Debug)]
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn fill(&mut self, len: usize) -> Vec<u8> {
        (0..len).map(|_| self.next() as u8).collect()
    }
}

/// Generates `count` operations of the given pattern.
///
/// # Arguments
///
/// * `pattern` - Access pattern.
/// * `count` - Number of operations.
/// * `protected_bytes` - Size of the protected region; every access stays inside it.
/// * `seed` - Generator seed (zero is replaced by one).
pub fn generate(pattern: Pattern, count: usize, protected_bytes: u64, seed: u64) -> Vec<WorkloadOp> {
    let blocks = (protected_bytes / BLOCK_BYTES).max(1);
    let mut rng = XorShift(seed.max(1));
    let block_bytes = BLOCK_BYTES as usize;

    match pattern {
        Pattern::Sequential => (0..count as u64)
            .map(|i| {
                let addr = (i / 2 % blocks) * BLOCK_BYTES;
                if i % 2 == 0 {
                    WorkloadOp::Write {
                        addr,
                        data: rng.fill(block_bytes),
                        posted: false,
                    }
                } else {
                    WorkloadOp::Read {
                        addr,
                        size: block_bytes,
                    }
                }
            })
            .collect(),
        Pattern::Random => (0..count)
            .map(|_| {
                let block = rng.next() % blocks;
                let size = (rng.next() % BLOCK_BYTES) as usize + 1;
                let offset = rng.next() % (BLOCK_BYTES - size as u64 + 1);
                let addr = block * BLOCK_BYTES + offset;
                if rng.next() % 4 == 0 {
                    WorkloadOp::Write {
                        addr,
                        data: rng.fill(size),
                        posted: false,
                    }
                } else {
                    WorkloadOp::Read { addr, size }
                }
            })
            .collect(),
        Pattern::WriteThenRead => {
            let half = count / 2;
            let mut ops: Vec<WorkloadOp> = (0..half as u64)
                .map(|i| WorkloadOp::Write {
                    addr: (i % blocks) * BLOCK_BYTES,
                    data: rng.fill(block_bytes),
                    posted: false,
                })
                .collect();
            ops.extend((0..(count - half) as u64).map(|i| WorkloadOp::Read {
                addr: (i % blocks) * BLOCK_BYTES,
                size: block_bytes,
            }));
            ops
        }
    }
}
