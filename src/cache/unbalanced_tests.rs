//! Tests for the asymmetric quantized cache allocator.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;
use crate::cache::config::FP8_ALLOC_LENGTH;
use crate::device::HostDevice;
use crate::quant::E5m2Kernel;
use crate::tensor::DType;

const BATCH: usize = 1;
const HEADS: usize = 2;
const K_DIM: usize = 48;
const V_DIM: usize = 16;

fn states(rng: &mut StdRng, seq: usize, dim: usize) -> HostTensor {
    let values: Vec<f32> = (0..BATCH * HEADS * seq * dim)
        .map(|_| rng.gen_range(-2.0..2.0))
        .collect();
    HostTensor::from_f32(DType::F32, BATCH, HEADS, seq, dim, &values).unwrap()
}

#[test]
fn test_create_with_independent_head_dims() {
    let device = HostDevice::new();
    let pair = init_unbalanced_fp8_cache(&device, BATCH, HEADS, 20, K_DIM, V_DIM).unwrap();
    assert_eq!(pair.len(), 0);
    assert_eq!(pair.key.head_dim(), K_DIM);
    assert_eq!(pair.value.head_dim(), V_DIM);
    assert_eq!(pair.key.seq_capacity(), 20 + FP8_ALLOC_LENGTH);
    assert_eq!(pair.value.seq_capacity(), 20 + FP8_ALLOC_LENGTH);
    // Byte footprints differ with the head dims.
    assert_eq!(
        pair.key.size_in_bytes() / K_DIM,
        pair.value.size_in_bytes() / V_DIM
    );
}

#[test]
fn test_append_and_restore_round_trip() {
    let device = HostDevice::new();
    let kernel = E5m2Kernel;
    let mut rng = StdRng::seed_from_u64(43);

    let pair = init_unbalanced_fp8_cache(&device, BATCH, HEADS, 0, K_DIM, V_DIM).unwrap();
    let keys = states(&mut rng, 30, K_DIM);
    let values = states(&mut rng, 30, V_DIM);
    let pair = append_unbalanced_fp8_cache(&device, &kernel, &pair, &keys, &values).unwrap();
    assert_eq!(pair.len(), 30);

    let (k_restored, v_restored) =
        super::super::quantized::restore_fp8_cache(&kernel, &pair, DType::F32).unwrap();
    assert_eq!(k_restored.head_dim(), K_DIM);
    assert_eq!(v_restored.head_dim(), V_DIM);
    let k_orig = keys.to_f32().unwrap();
    for (r, o) in k_restored.to_f32().unwrap().iter().zip(k_orig.iter()) {
        assert!((r - o).abs() <= o.abs() * 0.13 + 1e-6);
    }
}

#[test]
fn test_value_head_dim_does_not_affect_key_buffer() {
    // Asymmetric independence: identical key schedules against two value
    // widths produce identical key-buffer shapes and growth behavior.
    let device = HostDevice::new();
    let kernel = E5m2Kernel;

    let mut key_shapes = Vec::new();
    for v_dim in [16, 96] {
        let mut rng = StdRng::seed_from_u64(47);
        let mut pair = init_unbalanced_fp8_cache(&device, BATCH, HEADS, 0, K_DIM, v_dim).unwrap();
        let mut storage_changes = 0;
        for _ in 0..3 {
            let keys = states(&mut rng, 250, K_DIM);
            let values = states(&mut rng, 250, v_dim);
            let before = pair.key.storage_id();
            pair = append_unbalanced_fp8_cache(&device, &kernel, &pair, &keys, &values).unwrap();
            if pair.key.storage_id() != before {
                storage_changes += 1;
            }
        }
        key_shapes.push((
            pair.key.head_dim(),
            pair.key.seq_capacity(),
            pair.key.len(),
            storage_changes,
        ));
    }
    assert_eq!(key_shapes[0], key_shapes[1]);
}

#[test]
fn test_buffers_grow_independently_but_share_length() {
    let device = HostDevice::new();
    let kernel = E5m2Kernel;
    let mut rng = StdRng::seed_from_u64(53);

    let mut pair = init_unbalanced_fp8_cache(&device, BATCH, HEADS, 0, K_DIM, V_DIM).unwrap();
    for step in 0..2 {
        let seq = if step == 0 { 500 } else { 100 };
        let keys = states(&mut rng, seq, K_DIM);
        let values = states(&mut rng, seq, V_DIM);
        pair = append_unbalanced_fp8_cache(&device, &kernel, &pair, &keys, &values).unwrap();
        assert_eq!(pair.key.len(), pair.value.len());
    }
    assert_eq!(pair.len(), 600);
    assert!(pair.key.seq_capacity() >= 600);
    assert!(pair.value.seq_capacity() >= 600);
}

#[test]
fn test_shape_mismatch_rejected() {
    let device = HostDevice::new();
    let kernel = E5m2Kernel;
    let mut rng = StdRng::seed_from_u64(59);

    let pair = init_unbalanced_fp8_cache(&device, BATCH, HEADS, 0, K_DIM, V_DIM).unwrap();
    // Key/value step lengths disagree.
    let keys = states(&mut rng, 2, K_DIM);
    let values = states(&mut rng, 3, V_DIM);
    let err = append_unbalanced_fp8_cache(&device, &kernel, &pair, &keys, &values).unwrap_err();
    assert!(matches!(err, CacheError::ShapeMismatch(_)));

    // Wrong key head dim.
    let keys = states(&mut rng, 2, K_DIM + 8);
    let values = states(&mut rng, 2, V_DIM);
    let err = append_unbalanced_fp8_cache(&device, &kernel, &pair, &keys, &values).unwrap_err();
    assert!(matches!(err, CacheError::ShapeMismatch(_)));
}
