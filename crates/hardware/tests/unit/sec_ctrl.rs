//! Security Controller Unit Tests.
//!
//! Verifies the upstream contract of the dispatcher:
//! 1. **Validation:** Malformed requests come back with a typed error and are counted.
//! 2. **Flow control:** Back-pressure hands the request back and a retry follows.
//! 3. **Routing:** Responses echo the request and posted writes stay silent.

use cachet_core::common::{Direction, MemRequest, Outcome, RequestId, SecError};
use cachet_core::config::Scheme;
use cachet_core::secure::Controller;
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::harness::{TEST_REGION, TestContext, pattern, small_config};

fn reason_of(ctx: &mut TestContext, request: MemRequest) -> SecError {
    ctx.mem
        .try_send(request)
        .expect_err("request must be refused")
        .reason
}

// ══════════════════════════════════════════════════════════
// 1. Validation
// ══════════════════════════════════════════════════════════

#[test]
fn zero_and_oversized_accesses_are_invalid() {
    let mut ctx = TestContext::new(Scheme::Ct);
    assert_eq!(
        reason_of(&mut ctx, MemRequest::read(1, 0, 0)),
        SecError::InvalidSize { id: RequestId(1), size: 0 }
    );
    assert_eq!(
        reason_of(&mut ctx, MemRequest::write(2, 0, vec![0; 65])),
        SecError::InvalidSize { id: RequestId(2), size: 65 }
    );
}

#[test]
fn addresses_outside_region_are_refused() {
    let mut ctx = TestContext::new(Scheme::Ct);
    assert_eq!(ctx.mem.addr_range(), (0, TEST_REGION));
    assert_eq!(
        reason_of(&mut ctx, MemRequest::read(1, TEST_REGION, 4)),
        SecError::OutOfRange { id: RequestId(1), addr: TEST_REGION }
    );
    assert!(matches!(
        reason_of(&mut ctx, MemRequest::read(2, TEST_REGION - 2, 4)),
        SecError::OutOfRange { .. }
    ));
}

#[test]
fn accesses_spanning_two_blocks_are_refused() {
    let mut ctx = TestContext::new(Scheme::Mt);
    assert_eq!(
        reason_of(&mut ctx, MemRequest::read(1, 60, 8)),
        SecError::CrossesBlock { id: RequestId(1), addr: 60, size: 8 }
    );
}

#[test]
fn payload_must_match_direction_and_size() {
    let mut ctx = TestContext::new(Scheme::Ct);
    let mut short = MemRequest::write(1, 0, vec![1; 4]);
    short.size = 8;
    assert_eq!(
        reason_of(&mut ctx, short),
        SecError::PayloadMismatch { id: RequestId(1), len: 4, size: 8 }
    );

    let mut read_with_payload = MemRequest::read(2, 0, 4);
    read_with_payload.payload = Some(vec![0; 4]);
    assert!(matches!(
        reason_of(&mut ctx, read_with_payload),
        SecError::PayloadMismatch { .. }
    ));
    assert_eq!(ctx.mem.stats().rejected_invalid, 2);
    assert_eq!(ctx.mem.outstanding(), 0);
}

#[test]
fn in_flight_ids_cannot_be_reused() {
    let mut ctx = TestContext::new(Scheme::Ct);
    ctx.mem
        .try_send(MemRequest::read(5, 0, 64))
        .expect("first use is accepted");
    assert_eq!(
        reason_of(&mut ctx, MemRequest::write(5, 64, vec![0; 64])),
        SecError::DuplicateId(RequestId(5))
    );
    let responses = ctx.drive(Vec::new());
    assert_eq!(responses.len(), 1);

    // Retired ids are free again.
    let again = ctx.drive(vec![MemRequest::read(5, 128, 8)]);
    assert_eq!(again[0].id, RequestId(5));
}

// ══════════════════════════════════════════════════════════
// 2. Flow control
// ══════════════════════════════════════════════════════════

#[rstest]
#[case(Scheme::Ct)]
#[case(Scheme::Mt)]
fn full_read_path_pushes_back_then_signals_retry(#[case] scheme: Scheme) {
    let mut config = small_config(scheme);
    config.controller.read_queue = 2;
    let mut ctx = TestContext::with_config(&config);

    ctx.mem.try_send(MemRequest::read(1, 0, 64)).expect("room");
    ctx.mem.try_send(MemRequest::read(2, 64, 64)).expect("room");
    let rejected = ctx
        .mem
        .try_send(MemRequest::read(3, 128, 64))
        .expect_err("read path is full");
    assert!(rejected.is_back_pressure());
    assert_eq!(rejected.request, MemRequest::read(3, 128, 64));

    // Writes use their own path and are unaffected.
    ctx.mem
        .try_send(MemRequest::write(4, 4096, vec![9; 64]))
        .expect("write path has room");

    let mut retried = false;
    for _ in 0..10_000 {
        ctx.mem.tick();
        if ctx.mem.take_retry() {
            retried = true;
            break;
        }
    }
    assert!(retried, "retry notification never arrived");
    assert!(!ctx.mem.take_retry(), "retry is reported once");
    ctx.mem
        .try_send(rejected.request)
        .expect("room after retry");

    let mut responses = ctx.drive(Vec::new());
    while let Some(response) = ctx.mem.recv_response() {
        responses.push(response);
    }
    let stats = ctx.mem.stats();
    assert_eq!(stats.rejected_back_pressure, 1);
    assert_eq!(stats.retries_signalled, 1);
    assert_eq!(stats.reads_completed, 3);
}

#[test]
fn bounded_response_queue_holds_back_completions() {
    let mut config = small_config(Scheme::Ct);
    config.controller.response_queue = 1;
    let mut ctx = TestContext::with_config(&config);
    for id in 0..4 {
        ctx.mem
            .try_send(MemRequest::read(id, id * 64, 64))
            .expect("room");
    }
    for _ in 0..20_000 {
        ctx.mem.tick();
    }
    assert_eq!(ctx.mem.sec_ctrl().queued_responses(), 1);
    assert!(ctx.mem.outstanding() >= 3);

    let mut ids = Vec::new();
    for _ in 0..20_000 {
        while let Some(response) = ctx.mem.recv_response() {
            ids.push(response.id.0);
        }
        if ids.len() == 4 {
            break;
        }
        ctx.mem.tick();
    }
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2, 3]);
}

// ══════════════════════════════════════════════════════════
// 3. Routing
// ══════════════════════════════════════════════════════════

#[rstest]
#[case(Scheme::Ct)]
#[case(Scheme::Mt)]
fn responses_echo_request_identity(#[case] scheme: Scheme) {
    let mut ctx = TestContext::new(scheme);
    let write = ctx.write(0x123, &pattern(3, 5));
    assert_eq!(write.direction, Direction::Write);
    assert_eq!(write.outcome, Outcome::WriteAck);
    assert_eq!(write.addr.val(), 0x123);

    let id = ctx.next_id();
    let responses = ctx.drive(vec![MemRequest::read(id, 0x123, 5)]);
    assert_eq!(responses[0].id, RequestId(id));
    assert_eq!(responses[0].addr.val(), 0x123);
    assert_eq!(responses[0].direction, Direction::Read);
    assert_eq!(responses[0].data(), Some(&pattern(3, 5)[..]));
}

#[rstest]
#[case(Scheme::Ct)]
#[case(Scheme::Mt)]
fn posted_writes_complete_silently(#[case] scheme: Scheme) {
    let mut ctx = TestContext::new(scheme);
    let payload = pattern(11, 64);
    let responses = ctx.drive(vec![MemRequest::write(1, 0x800, payload.clone()).posted()]);
    assert!(responses.is_empty());

    let stats = ctx.mem.stats();
    assert_eq!(stats.posted_writes, 1);
    assert_eq!(stats.writes_completed, 1);
    assert_eq!(ctx.read_ok(0x800, 64), payload);
}

#[test]
fn requests_are_routed_by_declared_direction() {
    let mut ctx = TestContext::new(Scheme::Ct);
    ctx.mem.try_send(MemRequest::read(1, 0, 64)).expect("room");
    ctx.mem
        .try_send(MemRequest::write(2, 64, vec![0; 64]))
        .expect("room");
    let ctrl = ctx.mem.sec_ctrl();
    assert!(ctrl.read_port().state_of(RequestId(1)).is_some());
    assert!(ctrl.read_port().state_of(RequestId(2)).is_none());
    assert!(ctrl.write_port().state_of(RequestId(2)).is_some());
    assert_eq!(
        (ctrl.read_port().name(), ctrl.write_port().name()),
        ("read_ctrl", "write_ctrl")
    );
    let _ = ctx.drive(Vec::new());
}
