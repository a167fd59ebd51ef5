//! Main Memory, Controller and Bus Unit Tests.
//!
//! Verifies the memory-side timing models and the untrusted backing store:
//! 1. **Controllers:** Fixed latency and DRAM row-buffer timing.
//! 2. **Backing store:** Pristine zeros, line alignment, tamper hooks, access counters.
//! 3. **Buses:** Transit time and queueing behind earlier transfers.
//! 4. **Ports:** Bounded in-flight accesses and completion-time visibility.

use cachet_core::config::{BusConfig, MemoryConfig, MemoryController as ControllerKind};
use cachet_core::soc::interconnect::{Bus, BusId, Interconnect};
use cachet_core::soc::memory::MainMemory;
use cachet_core::soc::memory::controller::{
    self, DramController, MemoryController, SimpleController,
};
use cachet_core::soc::memory::port::{DataAccess, DataOp, DataPort};
use pretty_assertions::assert_eq;

use crate::common::mocks::fixed_latency;

fn simple_memory(latency: u64) -> MainMemory {
    MainMemory::new(Box::new(SimpleController::new(latency)))
}

// ══════════════════════════════════════════════════════════
// 1. Controllers
// ══════════════════════════════════════════════════════════

#[test]
fn simple_controller_is_constant() {
    let mut ctrl = SimpleController::new(37);
    assert_eq!(ctrl.access_latency(0), 37);
    assert_eq!(ctrl.access_latency(0xdead_0000), 37);
}

#[test]
fn dram_controller_tracks_open_row() {
    let mut ctrl = DramController::new(10, 20, 30).with_row_bytes(1024);
    // Cold: RAS + CAS.
    assert_eq!(ctrl.access_latency(0x0), 30);
    // Same row: CAS only.
    assert_eq!(ctrl.access_latency(0x3c0), 10);
    // Different row: precharge + RAS + CAS.
    assert_eq!(ctrl.access_latency(0x400), 60);
    assert_eq!(ctrl.row_hits(), 1);
    assert_eq!(ctrl.row_misses(), 2);
}

#[test]
fn from_config_honours_controller_kind() {
    let mut config = MemoryConfig {
        latency: 55,
        ..MemoryConfig::default()
    };
    config.controller = ControllerKind::Simple;
    assert_eq!(controller::from_config(&config).access_latency(0x1234), 55);

    config.controller = ControllerKind::Dram;
    let mut dram = controller::from_config(&config);
    let cold = dram.access_latency(0);
    assert_eq!(cold, config.t_ras + config.t_cas);
    assert_eq!(dram.access_latency(64), config.t_cas);
}

// ══════════════════════════════════════════════════════════
// 2. Backing store
// ══════════════════════════════════════════════════════════

#[test]
fn unwritten_lines_read_as_zero() {
    let mut mem = simple_memory(1);
    assert_eq!(mem.read_line(0x8000), [0u8; 64]);
    assert_eq!(mem.reads(), 1);
    assert_eq!(mem.resident_lines(), 0);
}

#[test]
fn lines_are_aligned_and_peek_is_uncounted() {
    let mut mem = simple_memory(1);
    mem.write_line(0x47, [5u8; 64]);
    assert_eq!(mem.peek_line(0x40), [5u8; 64]);
    assert_eq!(mem.peek_line(0x7f), [5u8; 64]);
    assert_eq!(mem.reads(), 0);
    assert_eq!(mem.writes(), 1);
}

#[test]
fn corrupt_flips_exactly_one_byte() {
    let mut mem = simple_memory(1);
    mem.write_line(0x100, [0xF0; 64]);
    mem.corrupt(0x105, 0x0F);
    let line = mem.peek_line(0x100);
    assert_eq!(line[5], 0xFF);
    assert_eq!(line.iter().filter(|&&b| b != 0xF0).count(), 1);

    // Tampering an unwritten line materializes it.
    mem.corrupt(0x2000, 0x01);
    assert_eq!(mem.peek_line(0x2000)[0], 0x01);
    assert_eq!(mem.resident_lines(), 2);
}

#[test]
fn memory_delegates_latency_to_its_controller() {
    let mut mem = MainMemory::new(Box::new(fixed_latency(9)));
    assert_eq!(mem.access_latency(0x40), 9);
}

// ══════════════════════════════════════════════════════════
// 3. Buses
// ══════════════════════════════════════════════════════════

#[test]
fn transit_time_is_latency_plus_beats() {
    let bus = Bus::new(16, 4);
    assert_eq!(bus.calculate_transit_time(64), 8);
    assert_eq!(bus.calculate_transit_time(8), 5);
}

#[test]
fn reservations_queue_behind_each_other() {
    let mut bus = Bus::new(16, 4);
    assert_eq!(bus.reserve(10, 64), 8);
    // The bus is occupied for four beats after cycle 10.
    assert_eq!(bus.reserve(10, 64), 12);
    assert_eq!(bus.wait_cycles(), 4);
    assert_eq!(bus.transfers(), 2);
    // Idle again by cycle 100.
    assert_eq!(bus.reserve(100, 64), 8);
    assert_eq!(bus.wait_cycles(), 4);
}

#[test]
fn interconnect_selects_bus_by_id() {
    let config = BusConfig {
        meta_bus_width: 8,
        meta_bus_latency: 1,
        mem_bus_width: 32,
        mem_bus_latency: 2,
    };
    let mut ic = Interconnect::new(&config);
    assert_eq!(ic.bus(BusId::Meta).calculate_transit_time(64), 9);
    assert_eq!(ic.bus(BusId::Mem).calculate_transit_time(64), 4);
    let _ = ic.bus_mut(BusId::Mem).reserve(0, 64);
    assert_eq!(ic.mem_bus.transfers(), 1);
    assert_eq!(ic.meta_bus.transfers(), 0);
}

// ══════════════════════════════════════════════════════════
// 4. Ports
// ══════════════════════════════════════════════════════════

#[test]
fn port_refuses_beyond_capacity() {
    let mut ic = Interconnect::new(&BusConfig::default());
    let mut mem = simple_memory(10);
    let mut port: DataPort<u32> = DataPort::new("test_port", BusId::Mem, 2);
    for token in 0..2 {
        let access = DataAccess {
            token,
            addr: u64::from(token) * 64,
            op: DataOp::Read,
        };
        assert!(port.issue(0, access, &mut ic, &mut mem).is_ok());
    }
    assert!(!port.can_accept());
    let refused = port.issue(
        0,
        DataAccess {
            token: 9,
            addr: 0x400,
            op: DataOp::Read,
        },
        &mut ic,
        &mut mem,
    );
    assert!(refused.is_err());
    assert_eq!(port.in_flight(), 2);
    assert_eq!(port.counts(), (2, 0));
}

#[test]
fn writes_become_visible_at_completion() {
    let mut ic = Interconnect::new(&BusConfig::default());
    let mut mem = simple_memory(10);
    let mut port: DataPort<&str> = DataPort::new("test_port", BusId::Meta, 4);
    let ready = port
        .issue(
            0,
            DataAccess {
                token: "w",
                addr: 0x80,
                op: DataOp::Write([3u8; 64]),
            },
            &mut ic,
            &mut mem,
        )
        .expect("port has room");
    assert_eq!(ready, ic.meta_bus.calculate_transit_time(64) + 10);

    assert!(port.drain(ready - 1, &mut mem).is_empty());
    assert_eq!(mem.peek_line(0x80), [0u8; 64]);

    let done = port.drain(ready, &mut mem);
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].token, "w");
    assert_eq!(done[0].data, None);
    assert_eq!(mem.peek_line(0x80), [3u8; 64]);
    assert!(port.can_accept());
}

#[test]
fn reads_return_contents_at_completion() {
    let mut ic = Interconnect::new(&BusConfig::default());
    let mut mem = simple_memory(5);
    mem.write_line(0xc0, [7u8; 64]);
    let mut port: DataPort<u8> = DataPort::new("test_port", BusId::Meta, 4);
    let ready = port
        .issue(
            3,
            DataAccess {
                token: 1,
                addr: 0xc0,
                op: DataOp::Read,
            },
            &mut ic,
            &mut mem,
        )
        .expect("port has room");
    let done = port.drain(ready + 10, &mut mem);
    assert_eq!(done[0].data, Some([7u8; 64]));
    assert_eq!(mem.reads(), 1);
}
