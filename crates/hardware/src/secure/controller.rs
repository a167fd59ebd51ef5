//! Sub-controller interface.
//!
//! `SecCtrl` talks to its read and write paths only through `Controller`. A
//! sub-controller accepts requests, reacts to metadata and data completions tagged
//! with its `Token`s, issues downstream work once per cycle, and hands finished
//! requests back one at a time.

use std::fmt;

use super::Token;
use super::backend::Backend;
use super::store::StoreCompletion;
use crate::common::{Cycle, MemRequest, MemResponse, ProtectedUnit, Rejected};
use crate::soc::memory::port::DataCompletion;

/// Lifecycle of a request inside a sub-controller.
///
/// `Received -> MetadataPending -> {MetadataReady | IntegrityFault} -> DataPending
/// -> Completed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    /// Accepted; waiting for earlier conflicting requests or for the store.
    Received,
    /// Metadata fetch issued.
    MetadataPending,
    /// Metadata verified; data work not yet issued.
    MetadataReady,
    /// Data access (and, for writes, the metadata update) in flight.
    DataPending,
    /// Finished successfully.
    Completed,
    /// Finished with a verification failure on the given unit.
    IntegrityFault(ProtectedUnit),
}

impl RequestState {
    /// Returns `true` for `Completed` and `IntegrityFault`.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::IntegrityFault(_))
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::MetadataPending => write!(f, "metadata-pending"),
            Self::MetadataReady => write!(f, "metadata-ready"),
            Self::DataPending => write!(f, "data-pending"),
            Self::Completed => write!(f, "completed"),
            Self::IntegrityFault(unit) => write!(f, "integrity-fault({unit})"),
        }
    }
}

/// A read-path or write-path controller behind `SecCtrl`.
pub trait Controller {
    /// Name used in logs and back-pressure errors.
    fn name(&self) -> &'static str;

    /// Returns `true` if `accept` would not refuse for lack of room.
    fn can_accept(&self) -> bool;

    /// Takes ownership of a validated request.
    ///
    /// # Returns
    ///
    /// The request back with `BackPressure` when the pending table is full.
    fn accept(
        &mut self,
        now: Cycle,
        request: MemRequest,
        backend: &mut Backend,
    ) -> Result<(), Rejected>;

    /// Delivers a finished metadata fetch or update tagged for this controller.
    fn on_metadata(&mut self, now: Cycle, completion: StoreCompletion, backend: &mut Backend);

    /// Delivers a finished data access tagged for this controller.
    fn on_data(&mut self, now: Cycle, completion: DataCompletion<Token>, backend: &mut Backend);

    /// Issues whatever downstream work is ready this cycle.
    fn advance(&mut self, now: Cycle, backend: &mut Backend);

    /// Removes the oldest finished request and returns its response.
    ///
    /// The request's table entry and hazard registration are released here.
    fn pop_response(&mut self, now: Cycle, backend: &mut Backend) -> Option<MemResponse>;

    /// Requests held, finished or not.
    fn outstanding(&self) -> usize;
}
