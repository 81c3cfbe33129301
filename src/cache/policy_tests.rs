//! Tests for representation selection.

use super::*;
use crate::device::{CapabilityTable, DeviceCaps};

fn integrated() -> DeviceCaps {
    CapabilityTable::default().lookup("mtl")
}

fn discrete() -> DeviceCaps {
    CapabilityTable::default().lookup("arc")
}

#[test]
fn test_explicit_override_wins() {
    let on = CacheSettings {
        quantize_kv: Some(true),
        ..Default::default()
    };
    // Even with unquantized weights on a host device.
    assert!(use_quantized_cache(&on, &DeviceCaps::host(), false, 1, 32, 32));

    let off = CacheSettings {
        quantize_kv: Some(false),
        low_mem: Some(true),
        ..Default::default()
    };
    // And it beats the low-memory override.
    assert!(!use_quantized_cache(&off, &integrated(), true, 1, 32, 8));
}

#[test]
fn test_low_mem_override_applies_when_quantize_unset() {
    let settings = CacheSettings {
        low_mem: Some(true),
        ..Default::default()
    };
    assert!(use_quantized_cache(&settings, &DeviceCaps::host(), false, 1, 32, 32));

    let settings = CacheSettings {
        low_mem: Some(false),
        ..Default::default()
    };
    // Explicit low_mem=false pins the decision off, heuristic not consulted.
    assert!(!use_quantized_cache(&settings, &integrated(), true, 1, 32, 8));
}

#[test]
fn test_unquantized_weights_never_quantize() {
    let settings = CacheSettings::default();
    assert!(!use_quantized_cache(&settings, &integrated(), false, 1, 32, 8));
    assert!(!use_quantized_cache(&settings, &discrete(), false, 4, 32, 8));
}

#[test]
fn test_integrated_ratio_heuristic() {
    let settings = CacheSettings::default();
    let caps = integrated();
    // ratio 32/8 = 4: eligible.
    assert!(use_quantized_cache(&settings, &caps, true, 1, 32, 8));
    // ratio 32/4 = 8: too wide a group.
    assert!(!use_quantized_cache(&settings, &caps, true, 1, 32, 4));
    // too few kv heads.
    assert!(!use_quantized_cache(&settings, &caps, true, 1, 8, 2));
    // batch does not matter for the integrated rule.
    assert!(use_quantized_cache(&settings, &caps, true, 8, 32, 8));
}

#[test]
fn test_discrete_batch_heuristic() {
    let settings = CacheSettings::default();
    let caps = discrete();
    assert!(!use_quantized_cache(&settings, &caps, true, 1, 32, 8));
    assert!(use_quantized_cache(&settings, &caps, true, 2, 32, 8));
    // Head count floor still applies.
    assert!(!use_quantized_cache(&settings, &caps, true, 2, 32, 2));
}

#[test]
fn test_host_device_never_quantizes_by_heuristic() {
    let settings = CacheSettings::default();
    assert!(!use_quantized_cache(&settings, &DeviceCaps::host(), true, 8, 32, 8));
}

#[test]
fn test_zero_kv_heads_is_ineligible() {
    let settings = CacheSettings::default();
    assert!(!use_quantized_cache(&settings, &integrated(), true, 1, 32, 0));
}

#[test]
fn test_policy_is_deterministic() {
    let settings = CacheSettings::default();
    let caps = integrated();
    let first = use_quantized_cache(&settings, &caps, true, 1, 32, 8);
    for _ in 0..100 {
        assert_eq!(use_quantized_cache(&settings, &caps, true, 1, 32, 8), first);
    }
}

#[test]
fn test_compressed_cache_window() {
    let settings = CacheSettings::default();
    let caps = integrated();
    assert!(!use_compressed_cache(&settings, &caps, 1799));
    assert!(use_compressed_cache(&settings, &caps, 1800));
    assert!(use_compressed_cache(&settings, &caps, 4500));
    assert!(!use_compressed_cache(&settings, &caps, 4501));
    // Discrete families have no window.
    assert!(!use_compressed_cache(&settings, &discrete(), 2000));
}

#[test]
fn test_performance_mode_excludes_compression() {
    let settings = CacheSettings {
        performance_mode: true,
        compress_kv: Some(true),
        ..Default::default()
    };
    assert!(!use_compressed_cache(&settings, &integrated(), 2000));
}

#[test]
fn test_compress_override_requires_accelerator() {
    let settings = CacheSettings {
        compress_kv: Some(true),
        ..Default::default()
    };
    assert!(use_compressed_cache(&settings, &integrated(), 10));
    assert!(use_compressed_cache(&settings, &discrete(), 10));
    assert!(!use_compressed_cache(&settings, &DeviceCaps::host(), 10));

    let off = CacheSettings {
        compress_kv: Some(false),
        ..Default::default()
    };
    assert!(!use_compressed_cache(&off, &integrated(), 2000));
}
