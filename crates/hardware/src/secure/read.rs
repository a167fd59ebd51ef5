//! Read-path controller.
//!
//! Per request:
//! 1. Wait until no earlier write to the block is in flight, then fetch its metadata.
//! 2. After the metadata is verified, read the ciphertext over the metadata bus.
//! 3. Spend `hash_cycles` checking the MAC and decrypting, then answer with the
//!    requested bytes or an integrity fault.

use tracing::{debug, warn};

use super::Token;
use super::backend::Backend;
use super::controller::{Controller, RequestState};
use super::crypto;
use super::store::{MetadataUnit, StoreCompletion};
use super::table::PendingTable;
use crate::common::{
    Block, Cycle, Direction, MemRequest, MemResponse, Outcome, Rejected, RequestId,
};
use crate::sim::event::TimedQueue;
use crate::soc::memory::port::{DataAccess, DataCompletion, DataOp};

/// Read-specific progress of a pending request.
#[derive(Debug, Default)]
pub struct ReadStage {
    unit: Option<MetadataUnit>,
    ciphertext: Option<Block>,
    plaintext: Vec<u8>,
}

/// Controller for the read path.
#[derive(Debug)]
pub struct ReadCtrl {
    table: PendingTable<ReadStage>,
    hash_cycles: u64,
    verify: TimedQueue<RequestId>,
}

impl ReadCtrl {
    /// Creates a read controller holding at most `capacity` requests.
    pub fn new(capacity: usize, hash_cycles: u64) -> Self {
        Self {
            table: PendingTable::new("read_ctrl", capacity),
            hash_cycles,
            verify: TimedQueue::new(),
        }
    }

    /// Lifecycle state of a held request.
    pub fn state_of(&self, id: RequestId) -> Option<RequestState> {
        self.table.get(id).map(|e| e.state)
    }

    fn finish_verify(&mut self, id: RequestId, backend: &Backend) {
        let Some(entry) = self.table.get_mut(id) else {
            return;
        };
        let (Some(unit), Some(ciphertext)) = (entry.stage.unit, entry.stage.ciphertext) else {
            return;
        };
        let outcome = crypto::open(
            backend.crypto(),
            unit.block_addr,
            unit.counter,
            unit.mac,
            &ciphertext,
        );
        let state = match outcome {
            Ok(plain) => {
                let offset = entry.request.addr.block_offset();
                entry.stage.plaintext = plain
                    .get(offset..offset + entry.request.size)
                    .map(<[u8]>::to_vec)
                    .unwrap_or_default();
                RequestState::Completed
            }
            Err(unit) => {
                warn!(id = %id, addr = entry.request.addr.val(), %unit, "read failed verification");
                RequestState::IntegrityFault(unit)
            }
        };
        self.table.finish(id, state);
    }
}

impl Controller for ReadCtrl {
    fn name(&self) -> &'static str {
        "read_ctrl"
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
        self.table.insert(now, request, ReadStage::default())?;
        backend.hazards_mut().register(block, id, Direction::Read);
        backend.stats_mut().reads_accepted += 1;
        debug!(id = %id, block, cycle = now, "read accepted");
        Ok(())
    }

    fn on_metadata(&mut self, now: Cycle, completion: StoreCompletion, _backend: &mut Backend) {
        let id = completion.token.id;
        match completion.result {
            Ok(unit) => {
                if let Some(entry) = self.table.get_mut(id) {
                    entry.stage.unit = Some(unit);
                    entry.state = RequestState::MetadataReady;
                }
                debug!(id = %id, cycle = now, "read metadata verified");
            }
            Err(unit) => self.table.finish(id, RequestState::IntegrityFault(unit)),
        }
    }

    fn on_data(&mut self, now: Cycle, completion: DataCompletion<Token>, _backend: &mut Backend) {
        let id = completion.token.id;
        if let Some(entry) = self.table.get_mut(id) {
            entry.stage.ciphertext = completion.data;
            self.verify.schedule(now + self.hash_cycles, id);
        }
    }

    fn advance(&mut self, now: Cycle, backend: &mut Backend) {
        while let Some(id) = self.verify.pop_due(now) {
            self.finish_verify(id, backend);
        }

        for id in self.table.ids() {
            let Some(entry) = self.table.get_mut(id) else {
                continue;
            };
            let block_addr = entry.request.addr.block_base().val();
            match entry.state {
                RequestState::Received => {
                    if !backend.hazards().may_start(entry.request.block(), id) {
                        if !entry.hazard_counted {
                            entry.hazard_counted = true;
                            backend.stats_mut().hazard_stalls += 1;
                        }
                        continue;
                    }
                    match backend.fetch_metadata(now, Token::read(id), block_addr) {
                        Ok(()) => entry.state = RequestState::MetadataPending,
                        Err(_) => {
                            entry.retries += 1;
                            backend.stats_mut().downstream_stalls += 1;
                        }
                    }
                }
                RequestState::MetadataReady => {
                    let access = DataAccess {
                        token: Token::read(id),
                        addr: block_addr,
                        op: DataOp::Read,
                    };
                    match backend.issue_data(now, access) {
                        Ok(_) => entry.state = RequestState::DataPending,
                        Err(_) => {
                            entry.retries += 1;
                            backend.stats_mut().downstream_stalls += 1;
                        }
                    }
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
            _ => Outcome::Data(entry.stage.plaintext),
        };
        let latency = now.saturating_sub(entry.accepted_at);
        backend
            .stats_mut()
            .record_read(latency, matches!(outcome, Outcome::IntegrityFault(_)));
        debug!(id = %request.id, latency, retries = entry.retries, "read retired");

        Some(MemResponse {
            id: request.id,
            addr: request.addr,
            direction: Direction::Read,
            outcome,
        })
    }

    fn outstanding(&self) -> usize {
        self.table.len()
    }
}
