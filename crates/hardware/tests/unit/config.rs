//! Configuration Unit Tests.
//!
//! Verifies defaults, JSON parsing with partial sections and aliases, and the
//! geometry checks performed by `Config::validate`.

use cachet_core::common::SecError;
use cachet_core::config::{Config, MemoryController, ReplacementPolicy, Scheme};
use pretty_assertions::assert_eq;

// ══════════════════════════════════════════════════════════
// 1. Defaults
// ══════════════════════════════════════════════════════════

#[test]
fn default_config_is_valid_ct() {
    let config = Config::default();
    assert_eq!(config.scheme, Scheme::Ct);
    assert_eq!(config.layout.protected_bytes, 1 << 30);
    assert_eq!(config.meta_cache.policy, ReplacementPolicy::Lru);
    assert_eq!(config.memory.controller, MemoryController::Simple);
    assert!(config.validate().is_ok());
}

#[test]
fn empty_json_yields_defaults() {
    let config = Config::from_json("{}").expect("empty object is a valid config");
    let default = Config::default();
    assert_eq!(config.scheme, default.scheme);
    assert_eq!(config.controller.read_queue, default.controller.read_queue);
    assert_eq!(config.crypto.key_seed, default.crypto.key_seed);
}

// ══════════════════════════════════════════════════════════
// 2. JSON parsing
// ══════════════════════════════════════════════════════════

#[test]
fn partial_sections_keep_other_fields() {
    let json = r#"{
        "scheme": "Mt",
        "meta_cache": { "ways": 8 },
        "crypto": { "hash_cycles": 12 }
    }"#;
    let config = Config::from_json(json).expect("valid config");
    assert_eq!(config.scheme, Scheme::Mt);
    assert_eq!(config.meta_cache.ways, 8);
    assert_eq!(config.meta_cache.size_bytes, 128 * 1024);
    assert_eq!(config.crypto.hash_cycles, 12);
    assert_eq!(config.crypto.key_seed, Config::default().crypto.key_seed);
}

#[test]
fn scheme_and_policy_aliases() {
    for (text, scheme) in [("\"CT\"", Scheme::Ct), ("\"mt\"", Scheme::Mt), ("\"MT\"", Scheme::Mt)] {
        let parsed: Scheme = serde_json::from_str(text).expect("alias parses");
        assert_eq!(parsed, scheme);
    }
    for (text, policy) in [
        ("\"PLRU\"", ReplacementPolicy::Plru),
        ("\"Mru\"", ReplacementPolicy::Mru),
        ("\"Fifo\"", ReplacementPolicy::Fifo),
        ("\"RANDOM\"", ReplacementPolicy::Random),
    ] {
        let parsed: ReplacementPolicy = serde_json::from_str(text).expect("alias parses");
        assert_eq!(parsed, policy);
    }
}

#[test]
fn malformed_json_is_a_config_error() {
    let err = Config::from_json("{ \"scheme\": 7 }").expect_err("wrong type");
    assert!(matches!(err, SecError::Config(_)));
}

#[test]
fn serialized_config_round_trips_through_from_json() {
    let mut config = Config::default();
    config.scheme = Scheme::Mt;
    config.memory.controller = MemoryController::Dram;
    let text = serde_json::to_string(&config).expect("serializes");
    let parsed = Config::from_json(&text).expect("parses back");
    assert_eq!(parsed.scheme, Scheme::Mt);
    assert_eq!(parsed.memory.controller, MemoryController::Dram);
}

// ══════════════════════════════════════════════════════════
// 3. Validation
// ══════════════════════════════════════════════════════════

fn assert_invalid(config: &Config, needle: &str) {
    match config.validate() {
        Err(SecError::Config(msg)) => assert!(msg.contains(needle), "message {msg:?} lacks {needle:?}"),
        other => panic!("expected a config error mentioning {needle:?}, got {other:?}"),
    }
}

#[test]
fn protected_region_must_be_power_of_two_and_large_enough() {
    let mut config = Config::default();
    config.layout.protected_bytes = 3 * 4096;
    assert_invalid(&config, "protected_bytes");
    config.layout.protected_bytes = 2048;
    assert_invalid(&config, "protected_bytes");
}

#[test]
fn cache_geometry_is_checked() {
    let mut config = Config::default();
    config.meta_cache.ways = 0;
    assert_invalid(&config, "ways");

    let mut config = Config::default();
    config.meta_cache.size_bytes = 1000;
    assert_invalid(&config, "size_bytes");

    let mut config = Config::default();
    config.meta_cache.mshrs = 0;
    assert_invalid(&config, "mshrs");
}

#[test]
fn queues_must_be_non_empty() {
    let mut config = Config::default();
    config.controller.response_queue = 0;
    assert_invalid(&config, "response_queue");
}

#[test]
fn dram_rows_must_be_power_of_two() {
    let mut config = Config::default();
    config.memory.controller = MemoryController::Dram;
    config.memory.row_bytes = 3000;
    assert_invalid(&config, "row_bytes");
}
