//! 8-bit quantized cache allocator and grower, asymmetric head dims.
//!
//! Some architectures project keys and values to different widths. The
//! contract matches the symmetric allocator except that every capacity and
//! stride computation runs independently per buffer; only the logical
//! length is shared.

use crate::device::Device;
use crate::quant::QuantizeKernel;
use crate::tensor::HostTensor;

use super::buffer::{CacheBuffer, CachePair, CacheRepr};
use super::config::CacheError;
use super::quantized::{alloc_quantized, check_quant_step, grow_quantized};

/// Allocate a quantized pair with independent key/value head dims and a
/// zero-length view over `current_length + FP8_ALLOC_LENGTH` positions.
pub fn init_unbalanced_fp8_cache(
    device: &dyn Device,
    batch: usize,
    heads: usize,
    current_length: usize,
    k_head_dim: usize,
    v_head_dim: usize,
) -> Result<CachePair, CacheError> {
    let capacity = current_length + super::config::FP8_ALLOC_LENGTH;
    let key = alloc_quantized(device, batch, heads, k_head_dim, capacity)?;
    let value = alloc_quantized(device, batch, heads, v_head_dim, capacity)?;
    CachePair::new(key, value)
}

/// Append a step to an asymmetric quantized pair.
///
/// Each buffer runs its own stride check and grows alone when short; a
/// value-side reallocation never touches the key buffer's storage.
pub fn append_unbalanced_fp8_cache(
    device: &dyn Device,
    kernel: &dyn QuantizeKernel,
    pair: &CachePair,
    keys: &HostTensor,
    values: &HostTensor,
) -> Result<CachePair, CacheError> {
    pair.ensure_repr(CacheRepr::Quantized)?;
    check_quant_step(pair, keys, values)?;

    let cur = pair.len();
    let new_len = cur + keys.seq_len();

    let key = ensure_room(device, &pair.key, cur, new_len)?;
    let value = ensure_room(device, &pair.value, cur, new_len)?;

    {
        let mut k_dst = key.region_mut(cur, keys.seq_len())?;
        let mut v_dst = value.region_mut(cur, values.seq_len())?;
        kernel.quantize(keys, values, &mut k_dst, &mut v_dst)?;
    }

    CachePair::new(key, value)
}

fn ensure_room(
    device: &dyn Device,
    buffer: &CacheBuffer,
    cur: usize,
    new_len: usize,
) -> Result<CacheBuffer, CacheError> {
    if buffer.row_stride() < new_len * buffer.head_dim() {
        grow_quantized(device, buffer, cur, new_len)?.with_len(new_len)
    } else {
        buffer.with_len(new_len)
    }
}

#[cfg(test)]
#[path = "unbalanced_tests.rs"]
mod tests;
