//! Representation-selection policy.
//!
//! Both functions are pure: evaluated once at generation start, and the
//! chosen representation is held fixed for the lifetime of that
//! generation's cache pairs.

use crate::device::DeviceCaps;

use super::config::CacheSettings;

/// Decide whether a generation uses the quantized cache.
///
/// Precedence: explicit quantize override, then the low-memory override,
/// then the unquantized-weights bail-out (an unquantized projection never
/// pairs with a quantized cache), then the device family's shape rule.
pub fn use_quantized_cache(
    settings: &CacheSettings,
    caps: &DeviceCaps,
    weights_quantized: bool,
    batch: usize,
    num_heads: usize,
    num_kv_heads: usize,
) -> bool {
    if let Some(explicit) = settings.quantize_kv {
        return explicit;
    }
    if let Some(low_mem) = settings.low_mem {
        return low_mem;
    }
    if !weights_quantized {
        return false;
    }
    let Some(rule) = &caps.quantized_kv else {
        return false;
    };
    if num_kv_heads == 0 || num_kv_heads < rule.min_kv_heads {
        return false;
    }
    let ratio_ok = rule
        .max_group_ratio
        .is_some_and(|max| num_heads / num_kv_heads <= max);
    let batch_ok = rule.when_batched && batch > 1;
    ratio_ok || batch_ok
}

/// Decide whether a generation additionally uses the compressed/windowed
/// cache variant.
///
/// Mutually exclusive with performance mode. An explicit override applies
/// only on accelerator devices; otherwise the device family's prompt-length
/// window decides.
pub fn use_compressed_cache(settings: &CacheSettings, caps: &DeviceCaps, prompt_len: usize) -> bool {
    if settings.performance_mode {
        return false;
    }
    match settings.compress_kv {
        Some(explicit) => explicit && caps.memory_class.is_accelerator(),
        None => caps
            .compress_prompt_range
            .is_some_and(|(lo, hi)| prompt_len >= lo && prompt_len <= hi),
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
