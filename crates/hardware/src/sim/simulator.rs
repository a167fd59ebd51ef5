//! Workload driver.
//!
//! `Simulator` plays the upstream side: it offers one request per cycle, holds a
//! refused request until the controller signals a retry, drains responses, and stops
//! once the workload is exhausted and the subsystem is idle.

use std::collections::VecDeque;

use tracing::{info, warn};

use super::loader::WorkloadOp;
use crate::common::constants::{HANG_DETECTION_THRESHOLD, STATUS_UPDATE_INTERVAL};
use crate::common::{MemRequest, MemResponse, SecError};
use crate::soc::SecureMemory;

/// Totals of one simulation run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Cycles simulated.
    pub cycles: u64,
    /// Responses received.
    pub completed: usize,
    /// Responses reporting an integrity fault.
    pub faults: usize,
    /// Requests refused for being malformed (dropped).
    pub rejected: usize,
}

/// Drives a workload through a `SecureMemory`.
#[derive(Debug)]
pub struct Simulator {
    memory: SecureMemory,
    workload: VecDeque<MemRequest>,
    held: Option<MemRequest>,
    waiting_retry: bool,
    responses: Vec<MemResponse>,
    rejected: usize,
    max_cycles: u64,
    hang_threshold: u64,
    last_progress: u64,
}

impl Simulator {
    /// Creates a driver for `ops`; request ids are the operations' positions.
    pub fn new(memory: SecureMemory, ops: &[WorkloadOp], max_cycles: u64) -> Self {
        let workload = ops
            .iter()
            .zip(0u64..)
            .map(|(op, id)| op.to_request(id))
            .collect();
        Self {
            memory,
            workload,
            held: None,
            waiting_retry: false,
            responses: Vec::new(),
            rejected: 0,
            max_cycles,
            hang_threshold: HANG_DETECTION_THRESHOLD,
            last_progress: 0,
        }
    }

    /// Sets how many cycles without a retired request count as a hang.
    #[must_use]
    pub const fn with_hang_threshold(mut self, cycles: u64) -> Self {
        self.hang_threshold = cycles;
        self
    }

    /// The simulated subsystem.
    pub const fn memory(&self) -> &SecureMemory {
        &self.memory
    }

    /// Responses received so far, in delivery order.
    pub fn responses(&self) -> &[MemResponse] {
        &self.responses
    }

    /// Returns `true` when every request has been sent and answered.
    pub fn is_done(&self) -> bool {
        self.held.is_none() && self.workload.is_empty() && self.memory.is_idle()
    }

    /// Offers at most one request, advances one cycle and collects responses.
    pub fn tick(&mut self) {
        if self.waiting_retry && self.memory.take_retry() {
            self.waiting_retry = false;
        }
        if !self.waiting_retry {
            let next = self.held.take().or_else(|| self.workload.pop_front());
            if let Some(request) = next {
                match self.memory.try_send(request) {
                    Ok(()) => {}
                    Err(rejected) if rejected.is_back_pressure() => {
                        self.held = Some(rejected.request);
                        self.waiting_retry = true;
                    }
                    Err(rejected) => {
                        warn!(id = %rejected.request.id, reason = %rejected.reason, "request dropped");
                        self.rejected += 1;
                    }
                }
            }
        }

        let in_flight = self.memory.outstanding();
        self.memory.tick();
        // Posted writes retire without a response.
        if self.memory.outstanding() < in_flight {
            self.last_progress = self.memory.now();
        }
        // A retry raised during this tick is picked up at the start of the next.
        while let Some(response) = self.memory.recv_response() {
            self.responses.push(response);
            self.last_progress = self.memory.now();
        }
    }

    /// Runs until the workload drains.
    ///
    /// # Returns
    ///
    /// A summary of the run, or `SecError::CycleLimit` when the cycle budget runs out
    /// or no request retires for the hang threshold (`HANG_DETECTION_THRESHOLD` unless
    /// set with `with_hang_threshold`) while requests are outstanding.
    pub fn run(&mut self) -> Result<RunSummary, SecError> {
        let start = self.memory.now();
        self.last_progress = start;
        while !self.is_done() {
            let now = self.memory.now();
            let elapsed = now - start;
            if elapsed >= self.max_cycles {
                return Err(self.limit(self.max_cycles));
            }
            if self.memory.outstanding() > 0 && now - self.last_progress >= self.hang_threshold {
                warn!(cycle = now, outstanding = self.memory.outstanding(), "no progress");
                return Err(self.limit(self.hang_threshold));
            }
            if elapsed > 0 && elapsed % STATUS_UPDATE_INTERVAL == 0 {
                info!(
                    cycle = now,
                    completed = self.responses.len(),
                    remaining = self.workload.len(),
                    "progress"
                );
            }
            self.tick();
        }
        Ok(self.summary(self.memory.now() - start))
    }

    fn limit(&self, limit: u64) -> SecError {
        SecError::CycleLimit {
            limit,
            outstanding: self.memory.outstanding(),
        }
    }

    fn summary(&self, cycles: u64) -> RunSummary {
        RunSummary {
            cycles,
            completed: self.responses.len(),
            faults: self.responses.iter().filter(|r| !r.is_ok()).count(),
            rejected: self.rejected,
        }
    }
}
