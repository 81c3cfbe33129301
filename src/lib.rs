//! Attention KV cache management for accelerator-backed autoregressive decoding.
//!
//! The cache manager owns the memory layout of the per-layer key/value
//! attention caches across generation steps: storage is allocated with
//! headroom along the sequence axis, logical views expose only the positions
//! holding valid data, and appends write in place until the headroom is
//! exhausted, at which point a growth pass allocates fresh storage and copies
//! the logical prefix forward. Two representations are supported: dense
//! fixed-precision (f32/f16) and block-quantized 8-bit, with independent key
//! and value head dimensions in the asymmetric variant.
//!
//! Surrounding collaborators stay external: the decoding loop owns cache
//! lifetime, hardware quantize/dequantize kernels plug in behind the
//! [`quant::QuantizeKernel`] trait, and devices plug in behind the
//! [`device::Device`] trait.

pub mod cache;
pub mod device;
pub mod quant;
pub mod tensor;

pub use cache::{
    update_cache_pair, use_compressed_cache, use_quantized_cache, CacheBuffer, CacheError,
    CachePair, CacheRepr, CacheSettings, CacheStats, GenerationCache, DENSE_ALLOC_BLOCK,
    FP8_ALLOC_LENGTH,
};
pub use device::{CapabilityTable, Device, DeviceCaps, HostDevice, MemoryClass, QuantRule};
pub use quant::{E5m2Kernel, QuantizeKernel};
pub use tensor::{DType, HostTensor};
