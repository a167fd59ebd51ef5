//! Metadata Layout Unit Tests.
//!
//! Verifies region placement, tree geometry, path construction and line
//! classification for small and medium protected regions.

use std::collections::HashSet;

use cachet_core::common::{LineAddr, ProtectedUnit, SecError};
use cachet_core::secure::layout::{LineKind, MetadataLayout};
use pretty_assertions::assert_eq;
use rstest::rstest;

// ══════════════════════════════════════════════════════════
// 1. Geometry
// ══════════════════════════════════════════════════════════

#[test]
fn one_page_region_has_a_single_tree_level() {
    let layout = MetadataLayout::new(4096).expect("valid size");
    assert_eq!(layout.blocks(), 64);
    assert_eq!(layout.nodes_at(0), 8);
    assert_eq!(layout.levels(), 1);
    assert_eq!(layout.nodes_at(1), 1);
    // 512 B of MACs, 512 B of counters, one node.
    assert_eq!(layout.metadata_end(), 4096 + 512 + 512 + 64);
}

#[rstest]
#[case(64 * 1024, 3)]
#[case(1 << 20, 4)]
#[case(1 << 30, 7)]
fn tree_depth_grows_with_region(#[case] bytes: u64, #[case] levels: u8) {
    let layout = MetadataLayout::new(bytes).expect("valid size");
    assert_eq!(layout.levels(), levels);
    assert_eq!(layout.nodes_at(levels), 1);
}

#[test]
fn unusable_sizes_are_rejected() {
    assert!(matches!(MetadataLayout::new(1024), Err(SecError::Config(_))));
    assert!(matches!(MetadataLayout::new(5000), Err(SecError::Config(_))));
}

// ══════════════════════════════════════════════════════════
// 2. Paths
// ══════════════════════════════════════════════════════════

#[test]
fn path_lines_ascend_from_mac_to_top() {
    let layout = MetadataLayout::new(64 * 1024).expect("valid size");
    for block in [0, 1, 7, 8, 63, 64, 511, 1023] {
        let lines = layout.path(block).lines();
        assert_eq!(lines.len(), 1 + 1 + layout.levels() as usize);
        assert!(
            lines.windows(2).all(|w| w[0] < w[1]),
            "lines of block {block} are not ascending: {lines:?}"
        );
    }
}

#[test]
fn neighbours_share_counter_line_but_not_slot() {
    let layout = MetadataLayout::new(64 * 1024).expect("valid size");
    let a = layout.path(8);
    let b = layout.path(9);
    assert_eq!(a.counter.line, b.counter.line);
    assert_ne!(a.counter.slot, b.counter.slot);
    assert_eq!(a.mac.line, b.mac.line);
    assert_ne!(layout.path(16).counter.line, a.counter.line);
}

#[test]
fn chain_links_point_at_parent_slots() {
    let layout = MetadataLayout::new(64 * 1024).expect("valid size");
    let path = layout.path(1023);
    assert_eq!(path.chain[0].index, 1023 / 8);
    assert_eq!(path.chain[0].parent_slot(), (1023 / 8) % 8);
    assert_eq!(path.chain[1].index, 1023 / 64);
    assert_eq!(path.link(layout.levels()).map(|l| l.index), Some(0));
    assert!(path.link(layout.levels() + 1).is_none());
}

#[test]
fn every_slot_is_owned_by_exactly_one_block() {
    let layout = MetadataLayout::new(4096).expect("valid size");
    let mut macs = HashSet::new();
    let mut counters = HashSet::new();
    for block in 0..layout.blocks() {
        assert!(macs.insert(layout.mac_slot(block).byte_addr()));
        assert!(counters.insert(layout.counter_slot(block).byte_addr()));
    }
    assert!(macs.is_disjoint(&counters));
}

// ══════════════════════════════════════════════════════════
// 3. Classification
// ══════════════════════════════════════════════════════════

#[test]
fn lines_classify_to_their_region() {
    let layout = MetadataLayout::new(64 * 1024).expect("valid size");
    let path = layout.path(100);
    assert_eq!(layout.classify(path.mac.line), Some(LineKind::Mac));
    assert_eq!(layout.classify(path.counter.line), Some(LineKind::Counter));
    for link in &path.chain[1..] {
        assert_eq!(layout.classify(link.line), Some(LineKind::Node(link.level)));
    }
    assert_eq!(layout.classify(LineAddr::new(0)), None);
    assert_eq!(layout.classify(LineAddr::new(layout.metadata_end())), None);
    assert_eq!(layout.classify(LineAddr::new(path.mac.line.val() + 8)), None);
}

#[test]
fn line_kinds_map_to_fault_units() {
    assert_eq!(LineKind::Mac.unit(), ProtectedUnit::Mac);
    assert_eq!(LineKind::Counter.unit(), ProtectedUnit::Counter);
    assert_eq!(LineKind::Node(2).unit(), ProtectedUnit::TreeNode(2));
    assert!(!LineKind::Mac.is_tree_line());
    assert!(LineKind::Node(1).is_tree_line());
}
