//! Dense fixed-precision cache allocator and grower.
//!
//! Storage is sized `current_length + dense_alloc_block` positions so the
//! decoding loop reallocates once per block of generated tokens instead of
//! once per token. Appends write into pre-existing headroom; growth is the
//! caller's job and happens only when the room check fails.

use crate::device::Device;
use crate::tensor::{DType, HostTensor};

use super::buffer::{CacheBuffer, CachePair, CacheRepr};
use super::config::{CacheError, CacheSettings};

/// Allocate a dense pair with `capacity` positions of storage, exposing
/// `current_length` of them.
pub fn init_cache(
    device: &dyn Device,
    batch: usize,
    heads: usize,
    head_dim: usize,
    current_length: usize,
    capacity: usize,
    dtype: DType,
) -> Result<CachePair, CacheError> {
    let key = CacheBuffer::alloc(
        device,
        CacheRepr::Dense,
        dtype,
        batch,
        heads,
        head_dim,
        capacity,
        current_length,
    )?;
    let value = CacheBuffer::alloc(
        device,
        CacheRepr::Dense,
        dtype,
        batch,
        heads,
        head_dim,
        capacity,
        current_length,
    )?;
    CachePair::new(key, value)
}

/// Grow a dense pair to `new_capacity` positions, preserving its logical
/// contents.
///
/// Allocates fresh storage and copies the first `pair.len()` positions
/// forward; the returned views keep the old logical length. Under a
/// constrained-memory hint the device is asked to release cached memory
/// first, once, never as a retry after failure. Capacity never shrinks.
pub fn extend_cache(
    device: &dyn Device,
    settings: &CacheSettings,
    pair: &CachePair,
    new_capacity: usize,
) -> Result<CachePair, CacheError> {
    pair.ensure_repr(CacheRepr::Dense)?;
    let new_capacity = new_capacity.max(pair.key.seq_capacity());

    if settings.reclaim_hint() || device.memory_class().is_constrained() {
        device.reclaim_cached_memory();
    }

    tracing::debug!(
        old_capacity = pair.key.seq_capacity(),
        new_capacity,
        length = pair.len(),
        "growing dense kv cache"
    );

    let fresh = init_cache(
        device,
        pair.key.batch(),
        pair.key.heads(),
        pair.key.head_dim(),
        pair.len(),
        new_capacity,
        pair.key.dtype(),
    )?;
    fresh.key.copy_prefix_from(&pair.key, pair.len())?;
    fresh.value.copy_prefix_from(&pair.value, pair.len())?;
    Ok(fresh)
}

/// Append key/value states into existing headroom.
///
/// Precondition: both buffers already have room for `keys.seq_len()` more
/// positions. Fails with `InsufficientCapacity` otherwise, before touching
/// storage; capacity growth belongs to [`extend_cache`].
pub fn append(
    pair: &CachePair,
    keys: &HostTensor,
    values: &HostTensor,
) -> Result<CachePair, CacheError> {
    pair.ensure_repr(CacheRepr::Dense)?;
    check_step_shapes(pair, keys, values)?;

    let step = keys.seq_len();
    if !pair.key.has_room(step) || !pair.value.has_room(step) {
        return Err(CacheError::InsufficientCapacity {
            requested: step,
            remaining: pair.key.seq_capacity() - pair.len(),
        });
    }

    let new_len = pair.len() + step;
    pair.key.write_from(pair.len(), keys)?;
    pair.value.write_from(pair.len(), values)?;
    CachePair::new(pair.key.with_len(new_len)?, pair.value.with_len(new_len)?)
}

/// Per-step dense update policy.
///
/// `kv_seq_len` is the cumulative sequence length including this step's
/// tokens. No pair yet: allocate with a block of headroom and write the
/// initial tokens directly. No room: grow to `kv_seq_len +
/// dense_alloc_block`, then append. Otherwise: append in place.
pub fn update(
    device: &dyn Device,
    settings: &CacheSettings,
    past: Option<&CachePair>,
    keys: &HostTensor,
    values: &HostTensor,
    kv_seq_len: usize,
) -> Result<CachePair, CacheError> {
    if keys.head_dim() != values.head_dim() {
        return Err(CacheError::UnsupportedConfiguration(format!(
            "dense cache requires matching head dims, got k={} v={}",
            keys.head_dim(),
            values.head_dim()
        )));
    }

    match past {
        None => {
            if kv_seq_len != keys.seq_len() {
                return Err(CacheError::ShapeMismatch(format!(
                    "initial kv_seq_len {} does not match {} appended positions",
                    kv_seq_len,
                    keys.seq_len()
                )));
            }
            let pair = init_cache(
                device,
                keys.batch(),
                keys.heads(),
                keys.head_dim(),
                0,
                kv_seq_len + settings.dense_alloc_block,
                keys.dtype(),
            )?;
            append(&pair, keys, values)
        }
        Some(pair) => {
            pair.ensure_repr(CacheRepr::Dense)?;
            if kv_seq_len != pair.len() + keys.seq_len() {
                return Err(CacheError::ShapeMismatch(format!(
                    "kv_seq_len {} does not match cached {} + {} appended positions",
                    kv_seq_len,
                    pair.len(),
                    keys.seq_len()
                )));
            }
            if pair.key.has_room(keys.seq_len()) && pair.value.has_room(keys.seq_len()) {
                append(pair, keys, values)
            } else {
                let grown =
                    extend_cache(device, settings, pair, kv_seq_len + settings.dense_alloc_block)?;
                append(&grown, keys, values)
            }
        }
    }
}

fn check_step_shapes(
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
#[path = "dense_tests.rs"]
mod tests;
