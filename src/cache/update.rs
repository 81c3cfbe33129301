//! Per-step update dispatch and per-generation cache state.

use crate::device::Device;
use crate::quant::QuantizeKernel;
use crate::tensor::HostTensor;

use super::buffer::{CachePair, CacheRepr};
use super::config::{CacheError, CacheSettings, CacheStats};
use super::{dense, quantized, unbalanced};

/// Update one layer's cache pair with a step's key/value states.
///
/// `repr` is the representation chosen for the generation; passing a pair
/// of the other representation fails fast without touching it. Asymmetric
/// head dims route to the unbalanced quantized allocator and are rejected
/// for dense caches.
pub fn update_cache_pair(
    device: &dyn Device,
    kernel: &dyn QuantizeKernel,
    settings: &CacheSettings,
    repr: CacheRepr,
    past: Option<&CachePair>,
    keys: &HostTensor,
    values: &HostTensor,
    kv_seq_len: usize,
) -> Result<CachePair, CacheError> {
    if let Some(pair) = past {
        pair.ensure_repr(repr)?;
    }
    match repr {
        CacheRepr::Dense => dense::update(device, settings, past, keys, values, kv_seq_len),
        CacheRepr::Quantized => {
            let base = match past {
                Some(pair) => pair.clone(),
                None => {
                    if kv_seq_len != keys.seq_len() {
                        return Err(CacheError::ShapeMismatch(format!(
                            "initial kv_seq_len {} does not match {} appended positions",
                            kv_seq_len,
                            keys.seq_len()
                        )));
                    }
                    if keys.head_dim() == values.head_dim() {
                        quantized::init_fp8_cache(
                            device,
                            keys.batch(),
                            keys.heads(),
                            kv_seq_len,
                            keys.head_dim(),
                        )?
                    } else {
                        unbalanced::init_unbalanced_fp8_cache(
                            device,
                            keys.batch(),
                            keys.heads(),
                            kv_seq_len,
                            keys.head_dim(),
                            values.head_dim(),
                        )?
                    }
                }
            };
            if kv_seq_len != base.len() + keys.seq_len() {
                return Err(CacheError::ShapeMismatch(format!(
                    "kv_seq_len {} does not match cached {} + {} appended positions",
                    kv_seq_len,
                    base.len(),
                    keys.seq_len()
                )));
            }
            if base.key.head_dim() == base.value.head_dim() {
                quantized::append_fp8_cache(device, kernel, &base, keys, values)
            } else {
                unbalanced::append_unbalanced_fp8_cache(device, kernel, &base, keys, values)
            }
        }
    }
}

/// Full per-generation cache state: one optional pair per decoder layer.
///
/// Owned by the decoding loop; the representation is fixed at construction
/// (the policy decision) and every pair created through this state carries
/// it. Not shared across generations.
#[derive(Debug)]
pub struct GenerationCache {
    repr: CacheRepr,
    layers: Vec<Option<CachePair>>,
    stats: CacheStats,
}

impl GenerationCache {
    pub fn new(num_layers: usize, repr: CacheRepr) -> Self {
        Self {
            repr,
            layers: (0..num_layers).map(|_| None).collect(),
            stats: CacheStats::default(),
        }
    }

    pub fn repr(&self) -> CacheRepr {
        self.repr
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, layer: usize) -> Option<&CachePair> {
        self.layers.get(layer).and_then(|p| p.as_ref())
    }

    /// Cached positions so far, taken from the first populated layer.
    pub fn seq_len(&self) -> usize {
        self.layers
            .iter()
            .find_map(|p| p.as_ref())
            .map_or(0, CachePair::len)
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Apply one step's key/value states to `layer`.
    pub fn update_layer(
        &mut self,
        device: &dyn Device,
        kernel: &dyn QuantizeKernel,
        settings: &CacheSettings,
        layer: usize,
        keys: &HostTensor,
        values: &HostTensor,
        kv_seq_len: usize,
    ) -> Result<&CachePair, CacheError> {
        if layer >= self.layers.len() {
            return Err(CacheError::ShapeMismatch(format!(
                "layer {layer} out of range for {} layers",
                self.layers.len()
            )));
        }
        let before = self.layers[layer].as_ref().map(|p| p.key.storage_id());
        let updated = update_cache_pair(
            device,
            kernel,
            settings,
            self.repr,
            self.layers[layer].as_ref(),
            keys,
            values,
            kv_seq_len,
        )?;

        self.stats.appended_positions += keys.seq_len() as u64;
        match before {
            None => {
                self.stats.bytes_allocated +=
                    (updated.key.size_in_bytes() + updated.value.size_in_bytes()) as u64;
            }
            Some(id) if id != updated.key.storage_id() => {
                self.stats.grow_events += 1;
                self.stats.bytes_allocated +=
                    (updated.key.size_in_bytes() + updated.value.size_in_bytes()) as u64;
                if self.repr == CacheRepr::Dense
                    && (settings.reclaim_hint() || device.memory_class().is_constrained())
                {
                    self.stats.reclaim_hints += 1;
                }
            }
            Some(_) => {}
        }

        Ok(self.layers[layer].insert(updated))
    }

    /// Drop all pairs, keeping the representation. For reuse across
    /// generations of the same configuration.
    pub fn reset(&mut self) {
        for layer in &mut self.layers {
            *layer = None;
        }
        self.stats = CacheStats::default();
    }
}

#[cfg(test)]
#[path = "update_tests.rs"]
mod tests;
