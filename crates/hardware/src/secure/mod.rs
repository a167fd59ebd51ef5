//! Secure Memory Controllers.
//!
//! This module contains everything between the upstream port and main memory:
//! 1. **Layout:** Placement of MACs, counters and tree nodes above the protected data.
//! 2. **Crypto:** Tags, MACs and the counter-mode keystream.
//! 3. **Metadata Store:** Timed fetch/update of a block's metadata through the cache.
//! 4. **Hazards:** Per-block ordering between accepted requests.
//! 5. **Controllers:** The read path, the write path (CT or MT) and the `SecCtrl`
//!    dispatcher in front of them.
//!
//! Controllers never block. Every outstanding request is an entry in a pending table
//! that advances when a completion for it is delivered.

/// Shared memory-side resources driven by the controllers.
pub mod backend;

/// Sub-controller interface and request states.
pub mod controller;

/// Cryptographic primitives.
pub mod crypto;

/// Per-block request ordering.
pub mod hazards;

/// Metadata address arithmetic.
pub mod layout;

/// Read-path controller.
pub mod read;

/// Upstream dispatcher.
pub mod sec_ctrl;

/// Metadata store interface.
pub mod store;

/// Bounded pending-request table.
pub mod table;

/// Write-path controller.
pub mod write;

pub use backend::Backend;
pub use controller::{Controller, RequestState};
pub use crypto::{Blake3Engine, CryptoEngine, Tag};
pub use layout::MetadataLayout;
pub use read::ReadCtrl;
pub use sec_ctrl::SecCtrl;
pub use store::{MetadataStore, MetadataUnit};
pub use write::WriteCtrl;

use crate::common::RequestId;

/// Which sub-controller owns an in-flight access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathId {
    /// The read controller.
    Read,
    /// The write controller.
    Write,
}

/// Tag carried by metadata and data accesses so completions find their request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Token {
    /// Owning sub-controller.
    pub path: PathId,
    /// Request the access belongs to.
    pub id: RequestId,
}

impl Token {
    /// Token for an access made on behalf of a read.
    pub const fn read(id: RequestId) -> Self {
        Self {
            path: PathId::Read,
            id,
        }
    }

    /// Token for an access made on behalf of a write.
    pub const fn write(id: RequestId) -> Self {
        Self {
            path: PathId::Write,
            id,
        }
    }
}
