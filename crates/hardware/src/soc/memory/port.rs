//! Timed memory-side data ports.
//!
//! A port carries whole data blocks between a controller and main memory over one bus.
//! It holds a bounded number of accesses in flight and refuses more with
//! back-pressure. The functional effect of an access (the read of the line, or the
//! write becoming visible) happens when it completes, never when it is issued.

use std::fmt;

use super::MainMemory;
use crate::common::constants::LINE_BYTES;
use crate::common::{Block, Cycle, SecError};
use crate::sim::event::TimedQueue;
use crate::soc::interconnect::{BusId, Interconnect};

/// Operation carried by a data access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataOp {
    /// Fetch the block.
    Read,
    /// Store the block.
    Write(Block),
}

/// A block access handed to a port. `T` identifies the requester.
#[derive(Clone, Debug)]
pub struct DataAccess<T> {
    /// Requester token, returned with the completion.
    pub token: T,
    /// Base address of the block.
    pub addr: u64,
    /// What to do.
    pub op: DataOp,
}

/// A finished data access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataCompletion<T> {
    /// Requester token.
    pub token: T,
    /// Base address of the block.
    pub addr: u64,
    /// Block contents for reads; `None` for writes.
    pub data: Option<Block>,
}

/// A bounded, timed path to main memory over one bus.
pub struct DataPort<T> {
    name: &'static str,
    bus: BusId,
    capacity: usize,
    in_flight: TimedQueue<DataAccess<T>>,
    reads: u64,
    writes: u64,
}

impl<T> fmt::Debug for DataPort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataPort")
            .field("name", &self.name)
            .field("bus", &self.bus)
            .field("in_flight", &self.in_flight.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<T> DataPort<T> {
    /// Creates a port named `name` on `bus` with room for `capacity` accesses.
    pub fn new(name: &'static str, bus: BusId, capacity: usize) -> Self {
        Self {
            name,
            bus,
            capacity: capacity.max(1),
            in_flight: TimedQueue::new(),
            reads: 0,
            writes: 0,
        }
    }

    /// Port name used in logs and back-pressure errors.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Bus the port is attached to.
    pub const fn bus(&self) -> BusId {
        self.bus
    }

    /// Returns `true` if another access can be issued now.
    pub fn can_accept(&self) -> bool {
        self.in_flight.len() < self.capacity
    }

    /// Accesses currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Reads and writes issued so far.
    pub const fn counts(&self) -> (u64, u64) {
        (self.reads, self.writes)
    }

    /// Issues an access at `now`.
    ///
    /// # Arguments
    ///
    /// * `now` - Current cycle.
    /// * `access` - The block access.
    /// * `interconnect` - Buses; the port's bus is reserved for the transfer.
    /// * `memory` - Main memory; supplies the device latency.
    ///
    /// # Returns
    ///
    /// The cycle the access completes, or `SecError::BackPressure` when the port is full.
    pub fn issue(
        &mut self,
        now: Cycle,
        access: DataAccess<T>,
        interconnect: &mut Interconnect,
        memory: &mut MainMemory,
    ) -> Result<Cycle, SecError> {
        if !self.can_accept() {
            return Err(SecError::BackPressure { port: self.name });
        }
        let transit = interconnect.bus_mut(self.bus).reserve(now, LINE_BYTES);
        let ready = now + transit + memory.access_latency(access.addr);
        match access.op {
            DataOp::Read => self.reads += 1,
            DataOp::Write(_) => self.writes += 1,
        }
        tracing::trace!(port = self.name, addr = access.addr, ready, "data access issued");
        self.in_flight.schedule(ready, access);
        Ok(ready)
    }

    /// Completes every access due at `now`, applying it to memory.
    pub fn drain(&mut self, now: Cycle, memory: &mut MainMemory) -> Vec<DataCompletion<T>> {
        let mut done = Vec::new();
        while let Some(access) = self.in_flight.pop_due(now) {
            let data = match access.op {
                DataOp::Read => Some(memory.read_line(access.addr)),
                DataOp::Write(block) => {
                    memory.write_line(access.addr, block);
                    None
                }
            };
            done.push(DataCompletion {
                token: access.token,
                addr: access.addr,
                data,
            });
        }
        done
    }
}
