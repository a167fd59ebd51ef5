//! Write-path controller.
//!
//! One type serves both schemes. Per request:
//! 1. Wait until no earlier write to the block is in flight, then fetch (verify) its
//!    metadata.
//! 2. For a partial write, read and verify the old block and merge the new bytes.
//! 3. Spend `hash_cycles` sealing: counter + 1, fresh ciphertext and MAC.
//! 4. Wait until no earlier read of the block is in flight, then commit:
//!    - **CT:** metadata update through the store, then the data write over the
//!      metadata bus once the update has committed.
//!    - **MT:** metadata update and the data write over the bypass port at the same
//!      time; the request completes when both are done.

use tracing::{debug, trace, warn};

use super::Token;
use super::backend::Backend;
use super::controller::{Controller, RequestState};
use super::crypto;
use super::store::{MetadataUnit, StoreCompletion, StoreOpKind};
use super::table::{PendingEntry, PendingTable};
use crate::common::{
    Block, Cycle, Direction, MemRequest, MemResponse, Outcome, ProtectedUnit, Rejected,
    RequestId, SecError,
};
use crate::config::Scheme;
use crate::sim::event::TimedQueue;
use crate::soc::memory::port::{DataAccess, DataCompletion, DataOp, DataPort};

/// Write-specific progress of a pending request.
#[derive(Debug, Default)]
pub struct WriteStage {
    unit: Option<MetadataUnit>,
    plaintext: Option<Block>,
    merge_issued: bool,
    sealed: Option<(MetadataUnit, Block)>,
    meta_issued: bool,
    meta_done: bool,
    data_issued: bool,
    data_done: bool,
    fault: Option<ProtectedUnit>,
}

/// Controller for the write path, CT or MT.
#[derive(Debug)]
pub struct WriteCtrl {
    scheme: Scheme,
    table: PendingTable<WriteStage>,
    hash_cycles: u64,
    seal: TimedQueue<RequestId>,
    bypass: Option<DataPort<Token>>,
}

/// Copies `bytes` into `base` at `offset`.
fn merge(mut base: Block, offset: usize, bytes: &[u8]) -> Block {
    if let Some(dst) = base.get_mut(offset..offset + bytes.len()) {
        dst.copy_from_slice(bytes);
    }
    base
}

impl WriteCtrl {
    /// Creates a write controller.
    ///
    /// # Arguments
    ///
    /// * `scheme` - CT or MT.
    /// * `capacity` - Pending table size.
    /// * `hash_cycles` - Latency of sealing (and of verifying merged data).
    /// * `bypass` - Bypass data port; required for MT, refused for CT.
    ///
    /// # Returns
    ///
    /// The controller, or `SecError::Config` if `bypass` does not match `scheme`.
    pub fn new(
        scheme: Scheme,
        capacity: usize,
        hash_cycles: u64,
        bypass: Option<DataPort<Token>>,
    ) -> Result<Self, SecError> {
        match (scheme, bypass.is_some()) {
            (Scheme::Mt, false) => {
                return Err(SecError::Config("MT write path needs a bypass port".into()));
            }
            (Scheme::Ct, true) => {
                return Err(SecError::Config("CT write path has no bypass port".into()));
            }
            _ => {}
        }
        Ok(Self {
            scheme,
            table: PendingTable::new("write_ctrl", capacity),
            hash_cycles,
            seal: TimedQueue::new(),
            bypass,
        })
    }

    /// Scheme this controller implements.
    pub const fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The MT bypass port, if any.
    pub const fn bypass(&self) -> Option<&DataPort<Token>> {
        self.bypass.as_ref()
    }

    /// Lifecycle state of a held request.
    pub fn state_of(&self, id: RequestId) -> Option<RequestState> {
        self.table.get(id).map(|e| e.state)
    }

    fn start_sealing(&mut self, now: Cycle, id: RequestId) {
        self.seal.schedule(now + self.hash_cycles, id);
    }

    fn finish_sealing(&mut self, id: RequestId, backend: &Backend) {
        let Some(entry) = self.table.get_mut(id) else {
            return;
        };
        let (Some(unit), Some(plain)) = (entry.stage.unit, entry.stage.plaintext) else {
            return;
        };
        let counter = unit.counter.saturating_add(1);
        let (ciphertext, mac) = crypto::seal(backend.crypto(), unit.block_addr, counter, &plain);
        entry.stage.sealed = Some((unit.resealed(counter, mac), ciphertext));
        trace!(id = %id, counter, "write sealed");
    }

    /// Moves the request to a terminal state once nothing it issued is outstanding.
    fn try_finish(&mut self, id: RequestId) {
        let Some(entry) = self.table.get(id) else {
            return;
        };
        let st = &entry.stage;
        let data_outstanding = st.data_issued && !st.data_done;
        let state = match st.fault {
            Some(unit) if !data_outstanding => RequestState::IntegrityFault(unit),
            None if st.meta_done && st.data_done => RequestState::Completed,
            _ => return,
        };
        self.table.finish(id, state);
    }

    /// Issues whichever commit accesses are due for a sealed request.
    fn commit(
        bypass: &mut Option<DataPort<Token>>,
        scheme: Scheme,
        entry: &mut PendingEntry<WriteStage>,
        now: Cycle,
        backend: &mut Backend,
    ) {
        let Some((unit, ciphertext)) = entry.stage.sealed else {
            return;
        };
        let id = entry.request.id;

        if !entry.stage.meta_issued {
            match backend.update_metadata(now, Token::write(id), unit) {
                Ok(()) => entry.stage.meta_issued = true,
                Err(_) => {
                    entry.retries += 1;
                    backend.stats_mut().downstream_stalls += 1;
                }
            }
        }

        let data_allowed = match scheme {
            Scheme::Ct => entry.stage.meta_done,
            Scheme::Mt => true,
        };
        if !data_allowed || entry.stage.data_issued {
            return;
        }
        let access = DataAccess {
            token: Token::write(id),
            addr: unit.block_addr,
            op: DataOp::Write(ciphertext),
        };
        let issued = match bypass.as_mut() {
            Some(port) => backend.issue_on(port, now, access).map(|_| {
                backend.stats_mut().bypass_writes += 1;
            }),
            None => backend.issue_data(now, access).map(|_| ()),
        };
        match issued {
            Ok(()) => entry.stage.data_issued = true,
            Err(_) => {
                entry.retries += 1;
                backend.stats_mut().downstream_stalls += 1;
            }
        }
    }
}

impl Controller for WriteCtrl {
    fn name(&self) -> &'static str {
        "write_ctrl"
    }

    fn can_accept(&self) -> bool {
        self.table.has_room()
    }

    fn accept(
        &mut self,
        now: Cycle,
        request: MemRequest,
        backend: &mut Backend,
    ) -> Result<(), Rejected> {
        let (id, block) = (request.id, request.block());
        self.table.insert(now, request, WriteStage::default())?;
        backend.hazards_mut().register(block, id, Direction::Write);
        backend.stats_mut().writes_accepted += 1;
        debug!(id = %id, block, scheme = %self.scheme, cycle = now, "write accepted");
        Ok(())
    }

    fn on_metadata(&mut self, now: Cycle, completion: StoreCompletion, _backend: &mut Backend) {
        let id = completion.token.id;
        let Some(entry) = self.table.get_mut(id) else {
            return;
        };
        let mut seal = false;
        match (completion.kind, completion.result) {
            (StoreOpKind::Fetch, Ok(unit)) => {
                entry.stage.unit = Some(unit);
                entry.state = RequestState::MetadataReady;
                if entry.request.is_full_block() {
                    let payload = entry.request.payload.as_deref().unwrap_or_default();
                    entry.stage.plaintext = Some(merge([0u8; 64], 0, payload));
                    seal = true;
                }
            }
            (StoreOpKind::Update, Ok(_)) => {
                entry.stage.meta_done = true;
                debug!(id = %id, cycle = now, "write metadata committed");
            }
            (kind, Err(unit)) => {
                if kind == StoreOpKind::Update {
                    entry.stage.meta_done = true;
                }
                entry.stage.fault = Some(unit);
            }
        }
        if seal {
            self.start_sealing(now, id);
        }
        self.try_finish(id);
    }

    fn on_data(&mut self, now: Cycle, completion: DataCompletion<Token>, backend: &mut Backend) {
        let id = completion.token.id;
        let Some(entry) = self.table.get_mut(id) else {
            return;
        };
        let mut seal = false;
        match completion.data {
            Some(old) => {
                let Some(unit) = entry.stage.unit else {
                    return;
                };
                match crypto::open(backend.crypto(), unit.block_addr, unit.counter, unit.mac, &old) {
                    Ok(plain) => {
                        let offset = entry.request.addr.block_offset();
                        let payload = entry.request.payload.as_deref().unwrap_or_default();
                        entry.stage.plaintext = Some(merge(plain, offset, payload));
                        seal = true;
                    }
                    Err(unit) => {
                        warn!(id = %id, addr = completion.addr, %unit, "old block failed verification");
                        entry.stage.fault = Some(unit);
                    }
                }
            }
            None => entry.stage.data_done = true,
        }
        if seal {
            self.start_sealing(now, id);
        }
        self.try_finish(id);
    }

    fn advance(&mut self, now: Cycle, backend: &mut Backend) {
        let drained = match self.bypass.as_mut() {
            Some(port) => backend.drain_port(port, now),
            None => Vec::new(),
        };
        for completion in drained {
            self.on_data(now, completion, backend);
        }
        while let Some(id) = self.seal.pop_due(now) {
            self.finish_sealing(id, backend);
        }

        for id in self.table.ids() {
            let Some(entry) = self.table.get_mut(id) else {
                continue;
            };
            let block = entry.request.block();
            let block_addr = entry.request.addr.block_base().val();
            match entry.state {
                RequestState::Received => {
                    if !backend.hazards().may_start(block, id) {
                        if !entry.hazard_counted {
                            entry.hazard_counted = true;
                            backend.stats_mut().hazard_stalls += 1;
                        }
                        continue;
                    }
                    match backend.fetch_metadata(now, Token::write(id), block_addr) {
                        Ok(()) => entry.state = RequestState::MetadataPending,
                        Err(_) => {
                            entry.retries += 1;
                            backend.stats_mut().downstream_stalls += 1;
                        }
                    }
                }
                RequestState::MetadataReady if entry.stage.fault.is_none() => {
                    if !entry.request.is_full_block() && !entry.stage.merge_issued {
                        let access = DataAccess {
                            token: Token::write(id),
                            addr: block_addr,
                            op: DataOp::Read,
                        };
                        match backend.issue_data(now, access) {
                            Ok(_) => entry.stage.merge_issued = true,
                            Err(_) => {
                                entry.retries += 1;
                                backend.stats_mut().downstream_stalls += 1;
                            }
                        }
                        continue;
                    }
                    if entry.stage.sealed.is_none() {
                        continue;
                    }
                    if backend.hazards().reads_before(block, id) > 0 {
                        backend.stats_mut().hazards_detected += 1;
                        trace!(id = %id, block, "write commit held behind earlier read");
                        continue;
                    }
                    entry.state = RequestState::DataPending;
                    Self::commit(&mut self.bypass, self.scheme, entry, now, backend);
                }
                RequestState::DataPending => {
                    Self::commit(&mut self.bypass, self.scheme, entry, now, backend);
                }
                _ => {}
            }
        }
    }

    fn pop_response(&mut self, now: Cycle, backend: &mut Backend) -> Option<MemResponse> {
        let entry = self.table.pop_ready()?;
        let request = entry.request;
        backend.hazards_mut().retire(request.block(), request.id);

        let outcome = match entry.state {
            RequestState::IntegrityFault(unit) => Outcome::IntegrityFault(unit),
            _ => Outcome::WriteAck,
        };
        let latency = now.saturating_sub(entry.accepted_at);
        backend
            .stats_mut()
            .record_write(latency, matches!(outcome, Outcome::IntegrityFault(_)));
        debug!(id = %request.id, latency, retries = entry.retries, "write retired");

        Some(MemResponse {
            id: request.id,
            addr: request.addr,
            direction: Direction::Write,
            outcome,
        })
    }

    fn outstanding(&self) -> usize {
        self.table.len()
    }
}
