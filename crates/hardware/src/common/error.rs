//! Secure Memory Error definitions.
//!
//! This module defines the error taxonomy of the secure memory controller. It provides:
//! 1. **Integrity Violations:** Verification failures attributed to a protected unit.
//! 2. **Flow Control:** Back-pressure returned when a bounded queue or table is full.
//! 3. **Validation:** Typed rejections for malformed requests and invalid configuration.
//! 4. **Rejection Wrapper:** `Rejected` hands a refused request back to its sender.
//!
//! Only integrity violations ever cross a controller boundary as a fault; every other
//! variant is returned synchronously to whoever made the call.

use thiserror::Error;

use super::data::{MemRequest, ProtectedUnit, RequestId};

/// Errors produced by the secure memory controller and its components.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SecError {
    /// A verified value did not match its stored tag or MAC.
    #[error("integrity violation for block {addr:#x} ({unit})")]
    IntegrityViolation {
        /// Base address of the affected data block.
        addr: u64,
        /// The unit that failed verification.
        unit: ProtectedUnit,
    },

    /// A bounded queue or table is full; the caller should retry later.
    #[error("{port} cannot accept more work")]
    BackPressure {
        /// Name of the component that refused.
        port: &'static str,
    },

    /// The address lies outside the protected region.
    #[error("request {id}: address {addr:#x} is outside the protected region")]
    OutOfRange {
        /// Offending request.
        id: RequestId,
        /// Offending address.
        addr: u64,
    },

    /// The access spans two data blocks.
    #[error("request {id}: {size}-byte access at {addr:#x} crosses a block boundary")]
    CrossesBlock {
        /// Offending request.
        id: RequestId,
        /// Start address.
        addr: u64,
        /// Requested size.
        size: usize,
    },

    /// The access size is zero or larger than a block.
    #[error("request {id}: invalid access size {size}")]
    InvalidSize {
        /// Offending request.
        id: RequestId,
        /// Requested size.
        size: usize,
    },

    /// A write's payload length disagrees with its size, or a read carries a payload.
    #[error("request {id}: payload of {len} bytes does not match size {size}")]
    PayloadMismatch {
        /// Offending request.
        id: RequestId,
        /// Payload length (0 when absent).
        len: usize,
        /// Declared size.
        size: usize,
    },

    /// The identifier is already used by an in-flight request.
    #[error("request {0} is already in flight")]
    DuplicateId(RequestId),

    /// A debug access touched a block that has timing requests in flight.
    #[error("block {addr:#x} has requests in flight")]
    BlockBusy {
        /// Base address of the busy block.
        addr: u64,
    },

    /// The simulation ran out of its cycle budget before the workload drained.
    #[error("cycle limit of {limit} reached with {outstanding} requests outstanding")]
    CycleLimit {
        /// Configured limit.
        limit: u64,
        /// Requests still in flight.
        outstanding: usize,
    },

    /// The configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SecError {
    /// Returns `true` for errors that clear up on their own (retry later).
    pub const fn is_back_pressure(&self) -> bool {
        matches!(self, Self::BackPressure { .. })
    }
}

/// A request the security controller refused, handed back to the sender.
///
/// The request is returned unmodified so the sender can resubmit it after a
/// retry notification when `reason` is back-pressure.
#[derive(Debug, Error)]
#[error("request {} refused: {reason}", .request.id)]
pub struct Rejected {
    /// The refused request.
    pub request: MemRequest,
    /// Why it was refused.
    pub reason: SecError,
}

impl Rejected {
    /// Wraps a request together with the reason it was refused.
    pub const fn new(request: MemRequest, reason: SecError) -> Self {
        Self { request, reason }
    }

    /// Returns `true` when the refusal is back-pressure rather than validation.
    pub const fn is_back_pressure(&self) -> bool {
        self.reason.is_back_pressure()
    }
}
