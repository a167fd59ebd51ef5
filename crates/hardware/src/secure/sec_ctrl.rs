//! Security Controller (upstream dispatcher).
//!
//! `SecCtrl` sits between the upstream port and the two sub-controllers. It provides:
//! 1. **Validation:** Malformed requests are refused with a typed error.
//! 2. **Dispatch:** Requests go, unmodified, to the read or write path by their
//!    declared direction.
//! 3. **Flow Control:** A full sub-controller refuses with back-pressure; the request is
//!    handed back and a retry notification is raised once room frees up.
//! 4. **Response Routing:** Finished requests are matched back by id into a bounded
//!    upstream queue. Posted writes are retired without a response.
//!
//! The only state kept here is the transient `id -> route` table.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, trace};

use super::PathId;
use super::backend::Backend;
use super::controller::Controller;
use crate::common::constants::BLOCK_BYTES;
use crate::common::{Cycle, Direction, MemRequest, MemResponse, Rejected, RequestId, SecError};

#[derive(Clone, Copy, Debug)]
struct Route {
    path: PathId,
    needs_response: bool,
}

/// Dispatcher in front of a read path `R` and a write path `W`.
#[derive(Debug)]
pub struct SecCtrl<R: Controller, W: Controller> {
    read_port: R,
    write_port: W,
    protected_bytes: u64,
    routes: HashMap<RequestId, Route>,
    responses: VecDeque<MemResponse>,
    response_capacity: usize,
    retry_owed: [bool; 2],
    retry_ready: bool,
}

const fn slot(path: PathId) -> usize {
    match path {
        PathId::Read => 0,
        PathId::Write => 1,
    }
}

impl<R: Controller, W: Controller> SecCtrl<R, W> {
    /// Creates a dispatcher.
    ///
    /// # Arguments
    ///
    /// * `read_port` - Read-path controller.
    /// * `write_port` - Write-path controller.
    /// * `protected_bytes` - Size of the protected region served.
    /// * `response_capacity` - Responses buffered for the upstream port.
    pub fn new(read_port: R, write_port: W, protected_bytes: u64, response_capacity: usize) -> Self {
        Self {
            read_port,
            write_port,
            protected_bytes,
            routes: HashMap::new(),
            responses: VecDeque::new(),
            response_capacity: response_capacity.max(1),
            retry_owed: [false; 2],
            retry_ready: false,
        }
    }

    /// Address range served: `[start, end)`.
    pub const fn addr_range(&self) -> (u64, u64) {
        (0, self.protected_bytes)
    }

    /// The read-path controller.
    pub const fn read_port(&self) -> &R {
        &self.read_port
    }

    /// The write-path controller.
    pub const fn write_port(&self) -> &W {
        &self.write_port
    }

    /// Checks a request's shape against the protected region.
    ///
    /// # Returns
    ///
    /// `Ok(())`, or the first error among `InvalidSize`, `OutOfRange`,
    /// `CrossesBlock` and `PayloadMismatch`.
    pub fn validate_shape(&self, request: &MemRequest) -> Result<(), SecError> {
        let id = request.id;
        let addr = request.addr.val();
        let size = request.size;
        if size == 0 || size as u64 > BLOCK_BYTES {
            return Err(SecError::InvalidSize { id, size });
        }
        if addr >= self.protected_bytes || addr + size as u64 > self.protected_bytes {
            return Err(SecError::OutOfRange { id, addr });
        }
        if request.addr.block_offset() + size > BLOCK_BYTES as usize {
            return Err(SecError::CrossesBlock { id, addr, size });
        }
        let len = request.payload.as_ref().map_or(0, Vec::len);
        let payload_ok = match request.direction {
            Direction::Read => request.payload.is_none(),
            Direction::Write => request.payload.is_some() && len == size,
        };
        if !payload_ok {
            return Err(SecError::PayloadMismatch { id, len, size });
        }
        Ok(())
    }

    /// Checks a request's shape and that its id is not in flight.
    pub fn validate(&self, request: &MemRequest) -> Result<(), SecError> {
        self.validate_shape(request)?;
        if self.routes.contains_key(&request.id) {
            return Err(SecError::DuplicateId(request.id));
        }
        Ok(())
    }

    /// Offers a request from upstream.
    ///
    /// # Returns
    ///
    /// `Ok(())` once a sub-controller owns the request, or the request back with
    /// the reason: back-pressure (retry after `take_retry`) or a validation error.
    pub fn try_send(
        &mut self,
        now: Cycle,
        request: MemRequest,
        backend: &mut Backend,
    ) -> Result<(), Rejected> {
        if let Err(reason) = self.validate(&request) {
            backend.stats_mut().rejected_invalid += 1;
            debug!(id = %request.id, %reason, "request rejected");
            return Err(Rejected::new(request, reason));
        }

        let id = request.id;
        let route = Route {
            path: match request.direction {
                Direction::Read => PathId::Read,
                Direction::Write => PathId::Write,
            },
            needs_response: request.needs_response,
        };
        let accepted = match route.path {
            PathId::Read => self.read_port.accept(now, request, backend),
            PathId::Write => self.write_port.accept(now, request, backend),
        };
        match accepted {
            Ok(()) => {
                let _ = self.routes.insert(id, route);
                trace!(id = %id, path = ?route.path, cycle = now, "request dispatched");
                Ok(())
            }
            Err(rejected) => {
                if rejected.is_back_pressure() {
                    let port = match route.path {
                        PathId::Read => self.read_port.name(),
                        PathId::Write => self.write_port.name(),
                    };
                    debug!(id = %id, port, cycle = now, "back-pressure");
                    self.retry_owed[slot(route.path)] = true;
                    backend.stats_mut().rejected_back_pressure += 1;
                }
                Err(rejected)
            }
        }
    }

    /// Advances one cycle.
    ///
    /// Delivers store and data completions to their owners, lets both paths issue,
    /// collects finished responses and raises a retry notification if a path that
    /// refused a request has room again.
    pub fn tick(&mut self, now: Cycle, backend: &mut Backend) {
        let (metadata, data) = backend.tick(now);
        for completion in metadata {
            match completion.token.path {
                PathId::Read => self.read_port.on_metadata(now, completion, backend),
                PathId::Write => self.write_port.on_metadata(now, completion, backend),
            }
        }
        for completion in data {
            match completion.token.path {
                PathId::Read => self.read_port.on_data(now, completion, backend),
                PathId::Write => self.write_port.on_data(now, completion, backend),
            }
        }

        self.read_port.advance(now, backend);
        self.write_port.advance(now, backend);
        self.collect(now, backend);

        for path in [PathId::Read, PathId::Write] {
            let room = match path {
                PathId::Read => self.read_port.can_accept(),
                PathId::Write => self.write_port.can_accept(),
            };
            if self.retry_owed[slot(path)] && room {
                self.retry_owed[slot(path)] = false;
                self.retry_ready = true;
                backend.stats_mut().retries_signalled += 1;
            }
        }
    }

    /// Moves finished responses into the upstream queue, alternating between paths.
    fn collect(&mut self, now: Cycle, backend: &mut Backend) {
        loop {
            let mut progressed = false;
            for path in [PathId::Read, PathId::Write] {
                if self.responses.len() >= self.response_capacity {
                    return;
                }
                let response = match path {
                    PathId::Read => self.read_port.pop_response(now, backend),
                    PathId::Write => self.write_port.pop_response(now, backend),
                };
                let Some(response) = response else {
                    continue;
                };
                progressed = true;
                let needs_response = self
                    .routes
                    .remove(&response.id)
                    .is_none_or(|route| route.needs_response);
                if needs_response {
                    self.responses.push_back(response);
                } else {
                    backend.stats_mut().posted_writes += 1;
                    trace!(id = %response.id, "posted write retired");
                }
            }
            if !progressed {
                return;
            }
        }
    }

    /// Takes the oldest response for upstream.
    pub fn recv_response(&mut self) -> Option<MemResponse> {
        self.responses.pop_front()
    }

    /// Returns `true` once after capacity frees following a back-pressure refusal.
    pub fn take_retry(&mut self) -> bool {
        std::mem::take(&mut self.retry_ready)
    }

    /// Requests accepted and not yet retired (responses still queued are not counted).
    pub fn outstanding(&self) -> usize {
        self.routes.len()
    }

    /// Responses waiting for upstream.
    pub fn queued_responses(&self) -> usize {
        self.responses.len()
    }
}
