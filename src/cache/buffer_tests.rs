//! Tests for cache buffers, views, and pairs.

use super::*;
use crate::device::HostDevice;
use crate::tensor::DType;

fn dense_buffer(device: &HostDevice, capacity: usize, len: usize) -> CacheBuffer {
    CacheBuffer::alloc(
        device,
        CacheRepr::Dense,
        DType::F32,
        1,
        2,
        4,
        capacity,
        len,
    )
    .unwrap()
}

fn step(seq: usize, fill: f32) -> HostTensor {
    HostTensor::from_f32(DType::F32, 1, 2, seq, 4, &vec![fill; 2 * seq * 4]).unwrap()
}

#[test]
fn test_view_shares_storage_without_copy() {
    let device = HostDevice::new();
    let buffer = dense_buffer(&device, 8, 0);
    let view = buffer.with_len(3).unwrap();
    assert_eq!(view.storage_id(), buffer.storage_id());
    assert_eq!(view.len(), 3);
    assert_eq!(view.seq_capacity(), 8);
    // A write through the original handle is visible through the view.
    buffer.write_from(0, &step(3, 5.0)).unwrap();
    let host = view.to_host().unwrap();
    assert!(host.to_f32().unwrap().iter().all(|&x| x == 5.0));
}

#[test]
fn test_view_cannot_exceed_capacity() {
    let device = HostDevice::new();
    let buffer = dense_buffer(&device, 8, 0);
    assert!(buffer.with_len(9).is_err());
    assert!(buffer.with_len(8).is_ok());
}

#[test]
fn test_row_stride_and_room_check() {
    let device = HostDevice::new();
    let buffer = dense_buffer(&device, 10, 7);
    assert_eq!(buffer.row_stride(), 40);
    assert!(buffer.has_room(3));
    assert!(!buffer.has_room(4));
}

#[test]
fn test_write_validates_before_mutating() {
    let device = HostDevice::new();
    let buffer = dense_buffer(&device, 4, 0);
    buffer.write_from(0, &step(2, 1.0)).unwrap();

    // Overflow: 3 more positions into capacity 4 starting at 2.
    let err = buffer.write_from(2, &step(3, 9.0)).unwrap_err();
    assert!(matches!(err, CacheError::InsufficientCapacity { .. }));

    // Wrong dtype rejected before any byte lands.
    let half_step = HostTensor::from_f32(DType::F16, 1, 2, 1, 4, &[2.0; 8]).unwrap();
    assert!(buffer.write_from(2, &half_step).is_err());

    // Earlier contents untouched.
    let host = buffer.with_len(2).unwrap().to_host().unwrap();
    assert!(host.to_f32().unwrap().iter().all(|&x| x == 1.0));
}

#[test]
fn test_copy_prefix_preserves_rows() {
    let device = HostDevice::new();
    let src = dense_buffer(&device, 4, 0);
    // Distinct values per row so layout mistakes show.
    let values: Vec<f32> = (0..2 * 3 * 4).map(|i| i as f32).collect();
    let states = HostTensor::from_f32(DType::F32, 1, 2, 3, 4, &values).unwrap();
    src.write_from(0, &states).unwrap();
    let src = src.with_len(3).unwrap();

    let dst = dense_buffer(&device, 16, 3);
    dst.copy_prefix_from(&src, 3).unwrap();
    assert_eq!(
        dst.to_host().unwrap().to_f32().unwrap(),
        src.to_host().unwrap().to_f32().unwrap()
    );
}

#[test]
fn test_copy_prefix_rejects_same_storage() {
    let device = HostDevice::new();
    let buffer = dense_buffer(&device, 4, 2);
    let view = buffer.with_len(2).unwrap();
    assert!(buffer.copy_prefix_from(&view, 2).is_err());
}

#[test]
fn test_repr_guards() {
    let device = HostDevice::new();
    let dense = dense_buffer(&device, 4, 0);
    let err = dense.ensure_repr(CacheRepr::Quantized).unwrap_err();
    match err {
        CacheError::RepresentationMismatch { expected, actual } => {
            assert_eq!(expected, CacheRepr::Quantized);
            assert_eq!(actual, CacheRepr::Dense);
        }
        other => panic!("unexpected error {other}"),
    }
    // Quantized read-back through the dense path is refused outright.
    let quant =
        CacheBuffer::alloc(&device, CacheRepr::Quantized, DType::U8, 1, 2, 4, 4, 0).unwrap();
    assert!(quant.to_host().is_err());
}

#[test]
fn test_repr_dtype_pairing_enforced() {
    let device = HostDevice::new();
    assert!(CacheBuffer::alloc(&device, CacheRepr::Dense, DType::U8, 1, 1, 4, 4, 0).is_err());
    assert!(CacheBuffer::alloc(&device, CacheRepr::Quantized, DType::F32, 1, 1, 4, 4, 0).is_err());
}

#[test]
fn test_degenerate_shape_rejected() {
    let device = HostDevice::new();
    let err = CacheBuffer::alloc(&device, CacheRepr::Dense, DType::F32, 1, 0, 4, 4, 0).unwrap_err();
    assert!(matches!(err, CacheError::UnsupportedConfiguration(_)));
}

#[test]
fn test_pair_invariants() {
    let device = HostDevice::new();
    let k = dense_buffer(&device, 4, 2);
    let v = dense_buffer(&device, 4, 3);
    assert!(CachePair::new(k, v).is_err());

    let k = dense_buffer(&device, 4, 2);
    let v = dense_buffer(&device, 8, 2);
    let pair = CachePair::new(k, v).unwrap();
    assert_eq!(pair.len(), 2);
    assert_eq!(pair.repr(), CacheRepr::Dense);
}

#[test]
fn test_region_bounds() {
    let device = HostDevice::new();
    let buffer = dense_buffer(&device, 4, 0);
    assert!(buffer.region(0, 4).is_ok());
    assert!(buffer.region(2, 3).is_err());
    assert!(buffer.region_mut(4, 1).is_err());
}
