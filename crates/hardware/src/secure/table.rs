//! Bounded pending-request table.
//!
//! Each sub-controller keeps its in-flight requests here, keyed by request id and kept
//! in acceptance order. An entry is created on acceptance and removed exactly when its
//! response is taken by the dispatcher. Entries that reached a terminal state wait in
//! a ready queue until then.

use std::collections::VecDeque;

use super::controller::RequestState;
use crate::common::{Cycle, MemRequest, Rejected, RequestId, SecError};

/// One in-flight request and its controller-specific progress.
#[derive(Debug)]
pub struct PendingEntry<S> {
    /// The request as accepted.
    pub request: MemRequest,
    /// Lifecycle state.
    pub state: RequestState,
    /// Downstream issues refused so far.
    pub retries: u32,
    /// Cycle the request was accepted.
    pub accepted_at: Cycle,
    /// Set once a hazard stall has been counted for this request.
    pub hazard_counted: bool,
    /// Controller-specific progress.
    pub stage: S,
}

/// Capacity-bounded table of in-flight requests.
#[derive(Debug)]
pub struct PendingTable<S> {
    name: &'static str,
    capacity: usize,
    entries: Vec<PendingEntry<S>>,
    ready: VecDeque<RequestId>,
}

impl<S> PendingTable<S> {
    /// Creates a table named `name` holding at most `capacity` requests.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            entries: Vec::with_capacity(capacity),
            ready: VecDeque::new(),
        }
    }

    /// Returns `true` when another request can be accepted.
    pub fn has_room(&self) -> bool {
        self.entries.len() < self.capacity
    }

    /// Number of requests held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the table holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if `id` is held.
    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.iter().any(|e| e.request.id == id)
    }

    /// Accepts a request in state `Received`.
    ///
    /// # Returns
    ///
    /// The request back with `BackPressure` when full, or `DuplicateId` if its id
    /// is already held.
    pub fn insert(&mut self, now: Cycle, request: MemRequest, stage: S) -> Result<(), Rejected> {
        if !self.has_room() {
            return Err(Rejected::new(
                request,
                SecError::BackPressure { port: self.name },
            ));
        }
        if self.contains(request.id) {
            let id = request.id;
            return Err(Rejected::new(request, SecError::DuplicateId(id)));
        }
        self.entries.push(PendingEntry {
            request,
            state: RequestState::Received,
            retries: 0,
            accepted_at: now,
            hazard_counted: false,
            stage,
        });
        Ok(())
    }

    /// Looks up an entry.
    pub fn get(&self, id: RequestId) -> Option<&PendingEntry<S>> {
        self.entries.iter().find(|e| e.request.id == id)
    }

    /// Looks up an entry for modification.
    pub fn get_mut(&mut self, id: RequestId) -> Option<&mut PendingEntry<S>> {
        self.entries.iter_mut().find(|e| e.request.id == id)
    }

    /// Ids of entries in acceptance order.
    pub fn ids(&self) -> Vec<RequestId> {
        self.entries.iter().map(|e| e.request.id).collect()
    }

    /// Iterates over entries in acceptance order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingEntry<S>> {
        self.entries.iter()
    }

    /// Moves an entry to a terminal state and queues it for response.
    ///
    /// Entries already terminal are left alone.
    pub fn finish(&mut self, id: RequestId, state: RequestState) {
        debug_assert!(state.is_terminal());
        if let Some(entry) = self.get_mut(id) {
            if entry.state.is_terminal() {
                return;
            }
            entry.state = state;
            self.ready.push_back(id);
        }
    }

    /// Removes and returns the oldest finished entry.
    pub fn pop_ready(&mut self) -> Option<PendingEntry<S>> {
        let id = self.ready.pop_front()?;
        let pos = self.entries.iter().position(|e| e.request.id == id)?;
        Some(self.entries.remove(pos))
    }
}
