//! 8-bit quantized cache allocator and grower, symmetric head dims.
//!
//! Storage holds one quantized byte per scalar. The quantize kernel writes
//! each step's states directly into the newly exposed byte region; growth
//! copies the prior quantized bytes forward untouched, so re-quantization
//! never happens.

use crate::device::Device;
use crate::quant::QuantizeKernel;
use crate::tensor::{DType, HostTensor};

use super::buffer::{CacheBuffer, CachePair, CacheRepr};
use super::config::{CacheError, FP8_ALLOC_LENGTH};

/// Allocate a quantized pair with `current_length + FP8_ALLOC_LENGTH`
/// positions of storage and a zero-length view.
pub fn init_fp8_cache(
    device: &dyn Device,
    batch: usize,
    heads: usize,
    current_length: usize,
    head_dim: usize,
) -> Result<CachePair, CacheError> {
    let capacity = current_length + FP8_ALLOC_LENGTH;
    let key = alloc_quantized(device, batch, heads, head_dim, capacity)?;
    let value = alloc_quantized(device, batch, heads, head_dim, capacity)?;
    CachePair::new(key, value)
}

pub(super) fn alloc_quantized(
    device: &dyn Device,
    batch: usize,
    heads: usize,
    head_dim: usize,
    capacity: usize,
) -> Result<CacheBuffer, CacheError> {
    CacheBuffer::alloc(
        device,
        CacheRepr::Quantized,
        DType::U8,
        batch,
        heads,
        head_dim,
        capacity,
        0,
    )
}

/// Grow one quantized buffer to hold `new_len` positions plus a block of
/// headroom, carrying its first `copy_len` quantized positions forward.
pub(super) fn grow_quantized(
    device: &dyn Device,
    buffer: &CacheBuffer,
    copy_len: usize,
    new_len: usize,
) -> Result<CacheBuffer, CacheError> {
    tracing::debug!(
        old_capacity = buffer.seq_capacity(),
        new_capacity = new_len + FP8_ALLOC_LENGTH,
        length = copy_len,
        "growing quantized kv cache buffer"
    );
    let fresh = alloc_quantized(
        device,
        buffer.batch(),
        buffer.heads(),
        buffer.head_dim(),
        new_len + FP8_ALLOC_LENGTH,
    )?;
    fresh.copy_prefix_from(buffer, copy_len)?;
    Ok(fresh)
}

/// Append a step to a symmetric quantized pair, growing first if the
/// stride check fails.
///
/// Returns views exposing `pair.len() + keys.seq_len()` positions; the new
/// region is populated by the kernel's quantize pass.
pub fn append_fp8_cache(
    device: &dyn Device,
    kernel: &dyn QuantizeKernel,
    pair: &CachePair,
    keys: &HostTensor,
    values: &HostTensor,
) -> Result<CachePair, CacheError> {
    pair.ensure_repr(CacheRepr::Quantized)?;
    if pair.key.head_dim() != pair.value.head_dim() {
        return Err(CacheError::UnsupportedConfiguration(
            "asymmetric head dims require the unbalanced quantized cache".into(),
        ));
    }
    check_quant_step(pair, keys, values)?;

    let cur = pair.len();
    let new_len = cur + keys.seq_len();

    // One stride check governs both buffers: same head dim, same capacity.
    let (key, value) = if pair.key.row_stride() < new_len * pair.key.head_dim() {
        (
            grow_quantized(device, &pair.key, cur, new_len)?.with_len(new_len)?,
            grow_quantized(device, &pair.value, cur, new_len)?.with_len(new_len)?,
        )
    } else {
        (pair.key.with_len(new_len)?, pair.value.with_len(new_len)?)
    };

    {
        let mut k_dst = key.region_mut(cur, keys.seq_len())?;
        let mut v_dst = value.region_mut(cur, values.seq_len())?;
        kernel.quantize(keys, values, &mut k_dst, &mut v_dst)?;
    }

    CachePair::new(key, value)
}

/// Dequantize a pair's logical contents into fresh dense tensors.
///
/// Pure with respect to the cache: allocates `target_dtype` outputs shaped
/// like the logical views and invokes the kernel's dequantize pass.
pub fn restore_fp8_cache(
    kernel: &dyn QuantizeKernel,
    pair: &CachePair,
    target_dtype: DType,
) -> Result<(HostTensor, HostTensor), CacheError> {
    pair.ensure_repr(CacheRepr::Quantized)?;
    let len = pair.len();
    let mut keys_out = HostTensor::zeros(
        target_dtype,
        pair.key.batch(),
        pair.key.heads(),
        len,
        pair.key.head_dim(),
    )?;
    let mut values_out = HostTensor::zeros(
        target_dtype,
        pair.value.batch(),
        pair.value.heads(),
        len,
        pair.value.head_dim(),
    )?;
    let k_src = pair.key.region(0, len)?;
    let v_src = pair.value.region(0, len)?;
    kernel.dequantize(&k_src, &v_src, &mut keys_out, &mut values_out)?;
    Ok((keys_out, values_out))
}

pub(super) fn check_quant_step(
    pair: &CachePair,
    keys: &HostTensor,
    values: &HostTensor,
) -> Result<(), CacheError> {
    if keys.seq_len() != values.seq_len() {
        return Err(CacheError::ShapeMismatch(format!(
            "key step of {} positions vs value step of {}",
            keys.seq_len(),
            values.seq_len()
        )));
    }
    if keys.batch() != pair.key.batch() || keys.heads() != pair.key.heads() {
        return Err(CacheError::ShapeMismatch(
            "appended states disagree with cache batch or head count".into(),
        ));
    }
    if keys.head_dim() != pair.key.head_dim() || values.head_dim() != pair.value.head_dim() {
        return Err(CacheError::ShapeMismatch(
            "appended states disagree with cache head dims".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "quantized_tests.rs"]
mod tests;
