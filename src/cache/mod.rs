//! Attention KV cache manager.
//!
//! Split into submodules:
//! - `config` — settings, constants, stats, and error definitions
//! - `buffer` — cache buffers, pairs, and view operations
//! - `dense` — dense fixed-precision allocator/grower
//! - `quantized` — 8-bit quantized allocator/grower (symmetric head dims)
//! - `unbalanced` — 8-bit quantized allocator/grower (asymmetric head dims)
//! - `policy` — pure representation-selection decisions
//! - `update` — per-step update dispatch and per-generation layer state

pub mod buffer;
pub mod config;
pub mod dense;
pub mod policy;
pub mod quantized;
pub mod unbalanced;
pub mod update;

pub use buffer::{CacheBuffer, CachePair, CacheRegion, CacheRegionMut, CacheRepr};
pub use config::{CacheError, CacheSettings, CacheStats, DENSE_ALLOC_BLOCK, FP8_ALLOC_LENGTH};
pub use policy::{use_compressed_cache, use_quantized_cache};
pub use update::{update_cache_pair, GenerationCache};
