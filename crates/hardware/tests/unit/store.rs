//! Metadata Store Unit Tests.
//!
//! Exercises the store directly, without the controllers above it:
//! 1. **Functional path:** Pristine fetches, commits, write-back and re-verification.
//! 2. **Timed path:** Completion timing, same-line serialization, MSHR and op limits.

use std::sync::Arc;

use cachet_core::common::{ProtectedUnit, RequestId, SecError};
use cachet_core::config::MetaCacheConfig;
use cachet_core::secure::store::{MemSide, StoreCompletion, StoreOpKind};
use cachet_core::secure::{Blake3Engine, MetadataLayout, MetadataStore, Token};
use cachet_core::soc::interconnect::Interconnect;
use cachet_core::soc::memory::MainMemory;
use cachet_core::soc::memory::controller::SimpleController;
use cachet_core::stats::SecStats;
use pretty_assertions::assert_eq;

use crate::common::harness::TEST_REGION;

const CACHE_LATENCY: u64 = 2;

/// A store plus the memory side it talks to.
struct Rig {
    store: MetadataStore,
    memory: MainMemory,
    interconnect: Interconnect,
    stats: SecStats,
    now: u64,
}

impl Rig {
    fn new(mshrs: usize, max_ops: usize) -> Self {
        let layout = MetadataLayout::new(TEST_REGION).expect("valid size");
        let cache = MetaCacheConfig {
            size_bytes: 4 * 1024,
            ways: 4,
            latency: CACHE_LATENCY,
            mshrs,
            ..MetaCacheConfig::default()
        };
        Self {
            store: MetadataStore::new(layout, &cache, Arc::new(Blake3Engine::new(7)), 4, max_ops),
            memory: MainMemory::new(Box::new(SimpleController::new(20))),
            interconnect: Interconnect::new(&Default::default()),
            stats: SecStats::default(),
            now: 0,
        }
    }

    fn with<R>(&mut self, f: impl FnOnce(&mut MetadataStore, u64, &mut MemSide<'_>) -> R) -> R {
        let mut side = MemSide {
            memory: &mut self.memory,
            interconnect: &mut self.interconnect,
            stats: &mut self.stats,
        };
        f(&mut self.store, self.now, &mut side)
    }

    /// Ticks until the store is idle, returning completions with their cycle.
    fn drain(&mut self) -> Vec<(u64, StoreCompletion)> {
        let mut done = Vec::new();
        for _ in 0..100_000 {
            if self.store.is_idle() {
                return done;
            }
            self.now += 1;
            let now = self.now;
            let completed = self.with(|store, now, side| store.tick(now, side));
            done.extend(completed.into_iter().map(|c| (now, c)));
        }
        panic!("store did not go idle");
    }
}

fn token(id: u64) -> Token {
    Token::read(RequestId(id))
}

// ══════════════════════════════════════════════════════════
// 1. Functional path
// ══════════════════════════════════════════════════════════

#[test]
fn pristine_block_has_zero_counter_and_mac() {
    let mut rig = Rig::new(4, 8);
    let unit = rig
        .with(|store, now, side| store.fetch_now(now, 0x1040, side))
        .expect("pristine metadata verifies");
    assert_eq!(unit.block_addr, 0x1040);
    assert_eq!(unit.counter, 0);
    assert_eq!(unit.mac, 0);
    assert_eq!(unit.parent.level, 1);
    assert_eq!(rig.store.root(), 0);
}

#[test]
fn committed_unit_survives_write_back() {
    let mut rig = Rig::new(4, 8);
    let base = rig
        .with(|store, now, side| store.fetch_now(now, 0x2000, side))
        .expect("pristine");
    rig.with(|store, now, side| store.update_now(now, base.resealed(3, 0xabcd), side))
        .expect("commit");
    assert_ne!(rig.store.root(), 0);

    let flushed = rig.with(|store, now, side| store.flush(now, side));
    assert!(flushed >= 2, "mac line and counter line are dirty");
    assert_eq!(rig.store.cache().occupancy(), 0);

    let unit = rig
        .with(|store, now, side| store.fetch_now(now, 0x2000, side))
        .expect("written-back metadata verifies");
    assert_eq!(unit.counter, 3);
    assert_eq!(unit.mac, 0xabcd);
}

#[test]
fn neighbour_counter_is_untouched_by_commit() {
    let mut rig = Rig::new(4, 8);
    let base = rig
        .with(|store, now, side| store.fetch_now(now, 0, side))
        .expect("pristine");
    rig.with(|store, now, side| store.update_now(now, base.resealed(9, 1), side))
        .expect("commit");
    let neighbour = rig
        .with(|store, now, side| store.fetch_now(now, 64, side))
        .expect("neighbour verifies");
    assert_eq!(neighbour.counter, 0);
}

#[test]
fn tampered_counter_line_is_blamed() {
    let mut rig = Rig::new(4, 8);
    let base = rig
        .with(|store, now, side| store.fetch_now(now, 0x400, side))
        .expect("pristine");
    rig.with(|store, now, side| store.update_now(now, base.resealed(1, 0x55), side))
        .expect("commit");
    let _ = rig.with(|store, now, side| store.flush(now, side));

    let counter_line = rig.store.layout().counter_slot(0x400 / 64).byte_addr();
    rig.memory.corrupt(counter_line, 0x80);

    let err = rig
        .with(|store, now, side| store.fetch_now(now, 0x400, side))
        .expect_err("tamper must be detected");
    assert!(matches!(
        err,
        SecError::IntegrityViolation {
            addr: 0x400,
            unit: ProtectedUnit::Counter
        }
    ));
}

// ══════════════════════════════════════════════════════════
// 2. Timed path
// ══════════════════════════════════════════════════════════

#[test]
fn uncontended_fetch_completes_at_its_estimate() {
    let mut rig = Rig::new(4, 8);
    let estimate =
        rig.with(|store, _, side| store.estimate_latency(0x3000, StoreOpKind::Fetch, side));
    rig.with(|store, now, side| store.submit_fetch(now, token(1), 0x3000, side))
        .expect("store has room");
    let done = rig.drain();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].0, estimate);
    assert_eq!(done[0].1.kind, StoreOpKind::Fetch);
    assert!(done[0].1.result.is_ok());
}

#[test]
fn warm_fetch_stops_at_first_cached_tree_line() {
    let mut rig = Rig::new(4, 8);
    let _ = rig.with(|store, now, side| store.fetch_now(now, 0x3000, side));
    let warm =
        rig.with(|store, _, side| store.estimate_latency(0x3000, StoreOpKind::Fetch, side));
    assert_eq!(warm, 2 * CACHE_LATENCY);
}

#[test]
fn accesses_to_one_line_are_serialized() {
    let mut rig = Rig::new(4, 8);
    // Blocks 0..4 share their MAC line and their counter line.
    for id in 0..4 {
        rig.with(|store, now, side| store.submit_fetch(now, token(id), id * 64, side))
            .expect("store has room");
    }
    let mac_line = rig.store.layout().mac_slot(0).line;
    assert_eq!(rig.store.line_outstanding(mac_line), 1);
    assert_eq!(rig.store.waiters(mac_line), 3);

    let done = rig.drain();
    assert_eq!(done.len(), 4);
    assert!(done.iter().all(|(_, c)| c.result.is_ok()));
    assert_eq!(rig.store.peak_line_outstanding(), 1);
    assert_eq!(rig.stats.peak_line_outstanding, 1);
    assert!(rig.stats.line_waits >= 3);
    assert_eq!(rig.store.waiters(mac_line), 0);
}

#[test]
fn updates_commit_in_submission_order() {
    let mut rig = Rig::new(4, 8);
    let base = rig
        .with(|store, now, side| store.fetch_now(now, 0x80, side))
        .expect("pristine");
    for counter in 1..=3 {
        let unit = base.resealed(counter, counter * 10);
        rig.with(|store, now, side| store.submit_update(now, token(counter), unit, side))
            .expect("store has room");
    }
    let done = rig.drain();
    let counters: Vec<u64> = done
        .iter()
        .map(|(_, c)| c.result.expect("update verifies").counter)
        .collect();
    assert_eq!(counters, vec![1, 2, 3]);
    let last = rig
        .with(|store, now, side| store.fetch_now(now, 0x80, side))
        .expect("verifies");
    assert_eq!((last.counter, last.mac), (3, 30));
}

#[test]
fn misses_beyond_mshr_count_stall() {
    let mut rig = Rig::new(1, 8);
    // Far apart: disjoint MAC, counter and lower node lines.
    rig.with(|store, now, side| store.submit_fetch(now, token(1), 0, side))
        .expect("room");
    rig.with(|store, now, side| store.submit_fetch(now, token(2), TEST_REGION / 2, side))
        .expect("room");
    let done = rig.drain();
    assert_eq!(done.len(), 2);
    assert!(rig.stats.mshr_stalls > 0);
    assert!(done.iter().all(|(_, c)| c.result.is_ok()));
}

#[test]
fn store_applies_back_pressure_at_op_limit() {
    let mut rig = Rig::new(4, 2);
    for id in 0..2 {
        rig.with(|store, now, side| store.submit_fetch(now, token(id), id * 4096, side))
            .expect("room");
    }
    assert!(!rig.store.can_accept());
    let refused = rig.with(|store, now, side| store.submit_fetch(now, token(9), 0x8000, side));
    assert!(matches!(refused, Err(SecError::BackPressure { .. })));
    let _ = rig.drain();
    assert!(rig.store.can_accept());
    assert_eq!(rig.stats.peak_store_ops, 2);
}
