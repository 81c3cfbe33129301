//! Cache settings, allocation constants, stats, and error definitions.

use super::buffer::CacheRepr;

/// Default headroom, in positions, added when a dense cache is created or
/// grown. Amortizes reallocation to one per block of generated tokens.
pub const DENSE_ALLOC_BLOCK: usize = 256;

/// Headroom, in positions, for quantized caches. Fixed, not tunable.
pub const FP8_ALLOC_LENGTH: usize = 512;

/// Environment flag: force the quantized cache on ("1") or off (any other
/// value). Highest-priority override.
pub const ENV_QUANTIZE: &str = "XPU_KV_QUANTIZE";
/// Environment flag: low-memory mode. Selects the quantized cache when the
/// quantize flag is unset, and hints dense growth to reclaim device caches.
pub const ENV_LOW_MEM: &str = "XPU_KV_LOW_MEM";
/// Environment flag: performance mode. Disables the compressed cache.
pub const ENV_PERFORMANCE_MODE: &str = "XPU_KV_PERFORMANCE_MODE";
/// Environment flag: force the compressed cache on ("1") or off.
pub const ENV_COMPRESS: &str = "XPU_KV_COMPRESS";
/// Environment variable overriding [`DENSE_ALLOC_BLOCK`].
pub const ENV_ALLOC_BLOCK: &str = "XPU_KV_ALLOC_BLOCK";

/// Cache behavior settings, resolved once at generation start.
///
/// Policy functions take this struct instead of reading the environment so
/// they stay pure; [`CacheSettings::from_env`] is the one place the
/// string-valued flags are read.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Explicit quantized-cache override. `None` defers to the heuristic.
    pub quantize_kv: Option<bool>,
    /// Low-memory mode. `None` means the flag was not set.
    pub low_mem: Option<bool>,
    /// Performance mode, mutually exclusive with the compressed cache.
    pub performance_mode: bool,
    /// Explicit compressed-cache override. `None` defers to the heuristic.
    pub compress_kv: Option<bool>,
    /// Dense allocation block length in positions.
    pub dense_alloc_block: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            quantize_kv: None,
            low_mem: None,
            performance_mode: false,
            compress_kv: None,
            dense_alloc_block: DENSE_ALLOC_BLOCK,
        }
    }
}

impl CacheSettings {
    /// Resolve settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings from an arbitrary key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| lookup(key).map(|v| v == "1");
        let dense_alloc_block = match lookup(ENV_ALLOC_BLOCK).map(|v| v.parse::<usize>()) {
            Some(Ok(n)) if n > 0 => n,
            Some(_) => {
                tracing::warn!(
                    "ignoring invalid {} value, using default {}",
                    ENV_ALLOC_BLOCK,
                    DENSE_ALLOC_BLOCK
                );
                DENSE_ALLOC_BLOCK
            }
            None => DENSE_ALLOC_BLOCK,
        };
        Self {
            quantize_kv: flag(ENV_QUANTIZE),
            low_mem: flag(ENV_LOW_MEM),
            performance_mode: flag(ENV_PERFORMANCE_MODE).unwrap_or(false),
            compress_kv: flag(ENV_COMPRESS),
            dense_alloc_block,
        }
    }

    /// Whether dense growth should hint the device to reclaim cached memory.
    pub fn reclaim_hint(&self) -> bool {
        self.low_mem == Some(true)
    }
}

/// Growth and write accounting for one generation's cache state.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    /// Reallocation events after the initial per-layer allocation.
    pub grow_events: u64,
    /// Grow events that carried the cached-memory reclaim hint.
    pub reclaim_hints: u64,
    /// Total bytes allocated for cache storage, including superseded arenas.
    pub bytes_allocated: u64,
    /// Positions appended across all layers.
    pub appended_positions: u64,
}

/// Errors for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("allocation of {requested} bytes failed on device '{device}': {reason}")]
    Allocation {
        requested: usize,
        device: String,
        reason: String,
    },

    #[error("unsupported cache configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("representation mismatch: expected {expected} cache, got {actual}")]
    RepresentationMismatch {
        expected: CacheRepr,
        actual: CacheRepr,
    },

    #[error("append of {requested} positions exceeds remaining capacity {remaining}")]
    InsufficientCapacity { requested: usize, remaining: usize },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("quantization kernel failed: {0}")]
    Kernel(String),

    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
