//! Memory Request and Response Types.
//!
//! This module defines the packets exchanged between the processor side and the secure
//! memory controller. These types are used for the following:
//! 1. **Classification:** Every request declares a direction; the dispatcher routes on it alone.
//! 2. **Identity:** A request identifier is stable end to end and pairs responses with requests.
//! 3. **Fault Reporting:** Responses name the protected unit whose verification failed.

use std::fmt;

use super::addr::PhysAddr;
use super::constants::BLOCK_BYTES;

/// Simulation time measured in controller cycles.
pub type Cycle = u64;

/// Image of a 64-byte data block or metadata line.
pub type Block = [u8; 64];

/// Identifier chosen by the sender; unique among the requests it has in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Direction of a memory access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Data read; answered with the decrypted bytes.
    Read,
    /// Data write; answered with an acknowledgement (when one is requested).
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// The protected unit a verification failure is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtectedUnit {
    /// The ciphertext of the data block.
    Data,
    /// The block's message authentication code.
    Mac,
    /// The counter line holding the block's counter.
    Counter,
    /// A tree node on the block's path, by level (1 is the level above the counters).
    TreeNode(u8),
}

impl fmt::Display for ProtectedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => write!(f, "data"),
            Self::Mac => write!(f, "mac"),
            Self::Counter => write!(f, "counter"),
            Self::TreeNode(level) => write!(f, "tree level {level}"),
        }
    }
}

/// A memory request arriving at the security controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemRequest {
    /// Sender-chosen identifier, echoed in the response.
    pub id: RequestId,
    /// Byte address of the first accessed byte.
    pub addr: PhysAddr,
    /// Declared direction; the only input to classification.
    pub direction: Direction,
    /// Number of bytes accessed (1..=64, within one block).
    pub size: usize,
    /// Bytes to write; `None` for reads.
    pub payload: Option<Vec<u8>>,
    /// When false the sender expects no response (posted write).
    pub needs_response: bool,
}

impl MemRequest {
    /// Builds a read of `size` bytes at `addr`.
    pub const fn read(id: u64, addr: u64, size: usize) -> Self {
        Self {
            id: RequestId(id),
            addr: PhysAddr(addr),
            direction: Direction::Read,
            size,
            payload: None,
            needs_response: true,
        }
    }

    /// Builds a write of `payload` at `addr`; the size is the payload length.
    pub fn write(id: u64, addr: u64, payload: Vec<u8>) -> Self {
        Self {
            id: RequestId(id),
            addr: PhysAddr(addr),
            direction: Direction::Write,
            size: payload.len(),
            payload: Some(payload),
            needs_response: true,
        }
    }

    /// Marks the request as posted: no response will be delivered for it.
    #[must_use]
    pub const fn posted(mut self) -> Self {
        self.needs_response = false;
        self
    }

    /// Returns `true` for read requests.
    pub fn is_read(&self) -> bool {
        self.direction == Direction::Read
    }

    /// Returns the index of the block the request touches.
    pub const fn block(&self) -> u64 {
        self.addr.block()
    }

    /// Returns `true` when the request covers its whole block.
    pub fn is_full_block(&self) -> bool {
        self.addr.block_offset() == 0 && self.size as u64 == BLOCK_BYTES
    }
}

/// Result carried by a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Verified plaintext of a read.
    Data(Vec<u8>),
    /// The write has been committed.
    WriteAck,
    /// Verification failed; no data is returned.
    IntegrityFault(ProtectedUnit),
}

/// A response returned upstream by the security controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemResponse {
    /// Identifier of the request this answers.
    pub id: RequestId,
    /// Address of the original request.
    pub addr: PhysAddr,
    /// Direction of the original request.
    pub direction: Direction,
    /// What happened.
    pub outcome: Outcome,
}

impl MemResponse {
    /// Returns `true` unless the response reports an integrity fault.
    pub const fn is_ok(&self) -> bool {
        !matches!(self.outcome, Outcome::IntegrityFault(_))
    }

    /// Returns the read data, if this is a successful read.
    pub fn data(&self) -> Option<&[u8]> {
        match &self.outcome {
            Outcome::Data(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the failing unit, if this response reports an integrity fault.
    pub const fn fault(&self) -> Option<ProtectedUnit> {
        match self.outcome {
            Outcome::IntegrityFault(unit) => Some(unit),
            _ => None,
        }
    }
}
