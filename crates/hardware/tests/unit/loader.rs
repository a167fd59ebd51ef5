//! Workload Loader Tests.
//!
//! Verifies JSON workload parsing and loading from disk, and the shape of the
//! generated patterns.

use std::io::Write;

use cachet_core::common::{Direction, MemRequest};
use cachet_core::sim::loader::{self, LoadError, Pattern, WorkloadOp};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[test]
fn parses_reads_and_writes_with_defaults() {
    let ops = loader::parse_workload(
        r#"[
            {"op": "write", "addr": 4096, "data": [1, 2, 3]},
            {"op": "read", "addr": 4096},
            {"op": "read", "addr": 4097, "size": 2},
            {"op": "write", "addr": 0, "data": [9], "posted": true}
        ]"#,
    )
    .expect("valid workload");
    assert_eq!(
        ops,
        vec![
            WorkloadOp::Write { addr: 4096, data: vec![1, 2, 3], posted: false },
            WorkloadOp::Read { addr: 4096, size: 64 },
            WorkloadOp::Read { addr: 4097, size: 2 },
            WorkloadOp::Write { addr: 0, data: vec![9], posted: true },
        ]
    );
}

#[test]
fn operations_become_requests() {
    let read = WorkloadOp::Read { addr: 8, size: 4 }.to_request(3);
    assert_eq!(read, MemRequest::read(3, 8, 4));

    let posted = WorkloadOp::Write { addr: 64, data: vec![7; 8], posted: true }.to_request(4);
    assert_eq!(posted.direction, Direction::Write);
    assert_eq!(posted.size, 8);
    assert!(!posted.needs_response);
}

#[test]
fn malformed_workload_is_a_parse_error() {
    assert!(matches!(
        loader::parse_workload(r#"[{"op": "erase", "addr": 0}]"#),
        Err(LoadError::Parse(_))
    ));
    assert!(matches!(loader::parse_workload("{"), Err(LoadError::Parse(_))));
}

#[test]
fn loads_workload_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(file, r#"[{{"op": "read", "addr": 128, "size": 16}}]"#).expect("write temp file");
    let ops = loader::load_workload(file.path()).expect("valid file");
    assert_eq!(ops, vec![WorkloadOp::Read { addr: 128, size: 16 }]);
}

#[test]
fn missing_file_reports_its_path() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("absent.json");
    let err = loader::load_workload(&path).expect_err("file does not exist");
    assert!(matches!(err, LoadError::Io { .. }));
    assert!(err.to_string().contains("absent.json"));
}

#[rstest]
#[case(Pattern::Sequential)]
#[case(Pattern::Random)]
#[case(Pattern::WriteThenRead)]
fn generated_workloads_stay_in_region(#[case] pattern: Pattern) {
    let ops = loader::generate(pattern, 300, 16 * 1024, 5);
    assert_eq!(ops.len(), 300);
    for op in &ops {
        let (addr, size) = match op {
            WorkloadOp::Read { addr, size } => (*addr, *size),
            WorkloadOp::Write { addr, data, .. } => (*addr, data.len()),
        };
        assert!(addr + size as u64 <= 16 * 1024);
    }
    assert_eq!(ops, loader::generate(pattern, 300, 16 * 1024, 5), "same seed, same stream");
}

#[test]
fn write_then_read_pattern_reads_what_it_wrote() {
    let ops = loader::generate(Pattern::WriteThenRead, 10, 1 << 20, 1);
    let (writes, reads) = ops.split_at(5);
    for (w, r) in writes.iter().zip(reads) {
        match (w, r) {
            (WorkloadOp::Write { addr: wa, .. }, WorkloadOp::Read { addr: ra, .. }) => {
                assert_eq!(wa, ra);
            }
            other => panic!("unexpected pair {other:?}"),
        }
    }
}
