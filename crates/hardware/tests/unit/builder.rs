//! Scheme Assembly and Debug Access Tests.
//!
//! Verifies topology validation, construction from explicit parts (mock crypto and
//! memory timing), and the untimed functional and atomic access paths.

use std::sync::Arc;

use cachet_core::SecureMemory;
use cachet_core::common::{MemRequest, Outcome, SecError};
use cachet_core::config::Scheme;
use cachet_core::soc::Topology;
use cachet_core::soc::interconnect::BusId;
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::harness::{TestContext, pattern, small_config};
use crate::common::mocks::{fixed_latency, transparent_crypto};

// ══════════════════════════════════════════════════════════
// 1. Topology
// ══════════════════════════════════════════════════════════

#[test]
fn canonical_topologies_are_valid() {
    let ct = Topology::for_scheme(Scheme::Ct);
    assert_eq!(ct.write_bypass, None);
    assert_eq!(ct.metadata_bus, BusId::Meta);
    assert!(ct.validate().is_ok());

    let mt = Topology::for_scheme(Scheme::Mt);
    assert_eq!(mt.write_bypass, Some(BusId::Mem));
    assert!(mt.validate().is_ok());
}

#[rstest]
#[case(Scheme::Ct, Some(BusId::Mem))]
#[case(Scheme::Mt, None)]
#[case(Scheme::Mt, Some(BusId::Meta))]
fn inconsistent_topologies_are_rejected(#[case] scheme: Scheme, #[case] bypass: Option<BusId>) {
    let topology = Topology {
        scheme,
        metadata_bus: BusId::Meta,
        write_bypass: bypass,
    };
    assert!(matches!(topology.validate(), Err(SecError::Config(_))));

    let built = SecureMemory::with_parts(
        &small_config(scheme),
        topology,
        Arc::new(transparent_crypto()),
        Box::new(fixed_latency(10)),
    );
    assert!(matches!(built, Err(SecError::Config(_))));
}

#[test]
fn invalid_config_does_not_build() {
    let mut config = small_config(Scheme::Ct);
    config.layout.protected_bytes = 3000;
    assert!(matches!(SecureMemory::new(&config), Err(SecError::Config(_))));
}

// ══════════════════════════════════════════════════════════
// 2. Explicit parts
// ══════════════════════════════════════════════════════════

#[rstest]
#[case(Scheme::Ct)]
#[case(Scheme::Mt)]
fn mock_parts_serve_timed_requests(#[case] scheme: Scheme) {
    let mem = SecureMemory::with_parts(
        &small_config(scheme),
        Topology::for_scheme(scheme),
        Arc::new(transparent_crypto()),
        Box::new(fixed_latency(7)),
    )
    .expect("consistent parts");
    assert_eq!(mem.scheme(), scheme);
    let mut ctx = TestContext::from_memory(mem);

    let data = pattern(4, 64);
    let _ = ctx.write(0x140, &data);
    assert_eq!(ctx.read_ok(0x140, 64), data);
    assert_eq!(ctx.read_ok(0x180, 64), vec![0u8; 64]);
}

// ══════════════════════════════════════════════════════════
// 3. Functional and atomic access
// ══════════════════════════════════════════════════════════

#[rstest]
#[case(Scheme::Ct)]
#[case(Scheme::Mt)]
fn functional_and_timed_paths_share_state(#[case] scheme: Scheme) {
    let mut ctx = TestContext::new(scheme);
    ctx.mem
        .functional_write(0x200, &pattern(1, 64))
        .expect("quiet block");
    ctx.mem
        .functional_write(0x210, &[0xAA; 2])
        .expect("quiet block");
    let mut expected = pattern(1, 64);
    expected[16..18].copy_from_slice(&[0xAA; 2]);
    assert_eq!(ctx.read_ok(0x200, 64), expected);

    let _ = ctx.write(0x240, &pattern(2, 64));
    assert_eq!(
        ctx.mem.functional_read(0x244, 4).expect("verifies"),
        pattern(2, 64)[4..8].to_vec()
    );
    // No cycles pass for debug access.
    let now = ctx.mem.now();
    let _ = ctx.mem.functional_read(0x200, 64);
    assert_eq!(ctx.mem.now(), now);
}

#[test]
fn debug_access_refuses_busy_blocks() {
    let mut ctx = TestContext::new(Scheme::Ct);
    ctx.mem
        .try_send(MemRequest::write(1, 0x300, pattern(5, 64)))
        .expect("room");
    assert_eq!(
        ctx.mem.functional_read(0x310, 8),
        Err(SecError::BlockBusy { addr: 0x300 })
    );
    assert!(matches!(
        ctx.mem.functional_write(0x300, &[1]),
        Err(SecError::BlockBusy { .. })
    ));
    assert!(ctx.mem.functional_read(0x340, 8).is_ok());

    let _ = ctx.drive(Vec::new());
    assert_eq!(ctx.mem.functional_read(0x300, 64).expect("quiet"), pattern(5, 64));
}

#[test]
fn debug_access_validates_shape() {
    let mut ctx = TestContext::new(Scheme::Mt);
    assert!(matches!(
        ctx.mem.functional_read(60, 8),
        Err(SecError::CrossesBlock { .. })
    ));
    assert!(matches!(
        ctx.mem.functional_write(0, &[]),
        Err(SecError::InvalidSize { .. })
    ));
}

#[rstest]
#[case(Scheme::Ct)]
#[case(Scheme::Mt)]
fn atomic_access_answers_with_a_latency(#[case] scheme: Scheme) {
    let mut ctx = TestContext::new(scheme);
    let (ack, write_cold) = ctx
        .mem
        .atomic_access(MemRequest::write(1, 0x500, pattern(6, 64)))
        .expect("well-formed");
    assert_eq!(ack.outcome, Outcome::WriteAck);
    assert!(write_cold > 0);

    let (read, read_warm) = ctx
        .mem
        .atomic_access(MemRequest::read(2, 0x500, 64))
        .expect("well-formed");
    assert_eq!(read.outcome, Outcome::Data(pattern(6, 64)));
    assert!(read_warm < write_cold);
    assert_eq!(ctx.read_ok(0x500, 64), pattern(6, 64));
}

#[test]
fn atomic_mt_write_overlaps_data_and_metadata() {
    let cold_write = |scheme| {
        let mut ctx = TestContext::new(scheme);
        ctx.mem
            .atomic_access(MemRequest::write(1, 0x700, pattern(1, 64)))
            .expect("well-formed")
            .1
    };
    assert!(cold_write(Scheme::Mt) < cold_write(Scheme::Ct));
}

/// Small config whose bypass bus is far slower than the metadata bus.
fn slow_bypass(scheme: Scheme) -> TestContext {
    let mut config = small_config(scheme);
    config.bus.mem_bus_latency = 500;
    TestContext::with_config(&config)
}

fn estimate(scheme: Scheme, request: MemRequest) -> u64 {
    slow_bypass(scheme)
        .mem
        .atomic_access(request)
        .expect("well-formed")
        .1
}

#[test]
fn atomic_read_estimate_ignores_the_bypass_bus() {
    let ct = estimate(Scheme::Ct, MemRequest::read(1, 0x1000, 64));
    let mt = estimate(Scheme::Mt, MemRequest::read(1, 0x1000, 64));
    assert_eq!(ct, mt);

    let mut timed = slow_bypass(Scheme::Mt);
    let _ = timed.read_ok(0x1000, 64);
    let measured = timed.mem.stats().avg_read_latency();
    assert!(
        (measured - mt as f64).abs() <= 2.0,
        "estimate {mt} vs timed {measured}"
    );
}

#[test]
fn atomic_partial_write_merges_over_the_metadata_bus() {
    let merge = |scheme| {
        estimate(scheme, MemRequest::write(1, 0x1000, vec![7; 8]))
            - estimate(scheme, MemRequest::write(1, 0x1000, vec![7; 64]))
    };
    assert_eq!(merge(Scheme::Mt), merge(Scheme::Ct));
    assert!(merge(Scheme::Mt) < 500);
}

#[rstest]
#[case(Scheme::Ct)]
#[case(Scheme::Mt)]
fn idle_means_the_backend_is_drained_too(#[case] scheme: Scheme) {
    let mut ctx = TestContext::new(scheme);
    ctx.mem
        .try_send(MemRequest::write(1, 0x800, pattern(3, 64)))
        .expect("room");
    ctx.mem.tick();
    assert!(!ctx.mem.is_idle());
    assert!(!ctx.mem.backend().is_idle(), "metadata fetch in flight");

    let _ = ctx.mem.run_until_idle(100_000).expect("drains");
    assert!(ctx.mem.backend().is_idle());
    assert_eq!(ctx.mem.store().active_ops(), 0);
}

#[test]
fn run_until_idle_honours_its_budget() {
    let mut ctx = TestContext::new(Scheme::Ct);
    ctx.mem
        .try_send(MemRequest::read(1, 0, 64))
        .expect("room");
    assert_eq!(
        ctx.mem.run_until_idle(1),
        Err(SecError::CycleLimit { limit: 1, outstanding: 1 })
    );
    let responses = ctx.mem.run_until_idle(100_000).expect("drains");
    assert_eq!(responses.len(), 1);
}

#[test]
fn flush_writes_back_only_dirty_lines() {
    let mut ctx = TestContext::new(Scheme::Mt);
    let _ = ctx.write(0, &pattern(1, 64));
    assert!(ctx.mem.flush_metadata_cache() > 0);
    assert_eq!(ctx.mem.flush_metadata_cache(), 0);
    assert_eq!(ctx.mem.store().cache().occupancy(), 0);
    assert_eq!(ctx.read_ok(0, 64), pattern(1, 64));
}
