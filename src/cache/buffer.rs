//! Cache buffers and pairs: storage handles plus logical-length views.
//!
//! A buffer is `{arena, capacity, length}` over a `[batch, heads, capacity,
//! head_dim]` layout. Views produced by [`CacheBuffer::with_len`] share the
//! arena, so extending the logical length never copies; only growth past
//! capacity allocates. The per-row stride (`capacity * head_dim` elements)
//! is the quantity the room checks are written against.

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::device::Device;
use crate::tensor::{ArenaRef, DType, HostTensor};

use super::config::CacheError;

/// Cache element representation, chosen once per generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheRepr {
    /// Fixed-precision scalars (f32/f16).
    Dense,
    /// One quantized byte per scalar.
    Quantized,
}

impl fmt::Display for CacheRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheRepr::Dense => write!(f, "dense"),
            CacheRepr::Quantized => write!(f, "quantized"),
        }
    }
}

/// The accumulated key or value tensor for one attention layer.
///
/// Cloning a buffer clones the handle, not the storage.
#[derive(Debug, Clone)]
pub struct CacheBuffer {
    arena: ArenaRef,
    dtype: DType,
    repr: CacheRepr,
    batch: usize,
    heads: usize,
    head_dim: usize,
    seq_capacity: usize,
    len: usize,
}

impl CacheBuffer {
    /// Allocate storage for `seq_capacity` positions on `device` and return
    /// a view exposing `len` of them.
    pub(crate) fn alloc(
        device: &dyn Device,
        repr: CacheRepr,
        dtype: DType,
        batch: usize,
        heads: usize,
        head_dim: usize,
        seq_capacity: usize,
        len: usize,
    ) -> Result<Self, CacheError> {
        if batch == 0 || heads == 0 || head_dim == 0 {
            return Err(CacheError::UnsupportedConfiguration(format!(
                "degenerate cache shape [{batch}, {heads}, _, {head_dim}]"
            )));
        }
        if len > seq_capacity {
            return Err(CacheError::ShapeMismatch(format!(
                "initial length {len} exceeds capacity {seq_capacity}"
            )));
        }
        match (repr, dtype.is_dense()) {
            (CacheRepr::Dense, true) | (CacheRepr::Quantized, false) => {}
            _ => {
                return Err(CacheError::UnsupportedConfiguration(format!(
                    "{repr} cache cannot store {dtype} elements"
                )));
            }
        }
        let bytes = batch * heads * seq_capacity * head_dim * dtype.size_in_bytes();
        let arena = device.alloc(bytes)?;
        Ok(Self {
            arena,
            dtype,
            repr,
            batch,
            heads,
            head_dim,
            seq_capacity,
            len,
        })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn repr(&self) -> CacheRepr {
        self.repr
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn heads(&self) -> usize {
        self.heads
    }

    pub fn head_dim(&self) -> usize {
        self.head_dim
    }

    /// Number of positions currently holding valid data.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated positions along the sequence axis.
    pub fn seq_capacity(&self) -> usize {
        self.seq_capacity
    }

    /// Elements between consecutive `(batch, head)` rows. The stride check
    /// `row_stride < new_len * head_dim` is the no-room condition.
    pub fn row_stride(&self) -> usize {
        self.seq_capacity * self.head_dim
    }

    /// Whether `additional` more positions fit without reallocation.
    pub fn has_room(&self, additional: usize) -> bool {
        self.row_stride() >= (self.len + additional) * self.head_dim
    }

    /// Total allocated bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.arena.len()
    }

    /// Identity of the backing storage. Two views over the same allocation
    /// report the same id.
    pub fn storage_id(&self) -> usize {
        Arc::as_ptr(&self.arena) as usize
    }

    /// A new handle over the same storage exposing `len` positions.
    pub fn with_len(&self, len: usize) -> Result<Self, CacheError> {
        if len > self.seq_capacity {
            return Err(CacheError::ShapeMismatch(format!(
                "view of {len} positions over capacity {}",
                self.seq_capacity
            )));
        }
        let mut view = self.clone();
        view.len = len;
        Ok(view)
    }

    /// Fail unless this buffer uses `expected`.
    pub fn ensure_repr(&self, expected: CacheRepr) -> Result<(), CacheError> {
        if self.repr != expected {
            return Err(CacheError::RepresentationMismatch {
                expected,
                actual: self.repr,
            });
        }
        Ok(())
    }

    fn row_chunk_bounds(&self, b: usize, h: usize, start: usize, positions: usize) -> (usize, usize) {
        let elem = self.dtype.size_in_bytes();
        let offset = ((b * self.heads + h) * self.seq_capacity + start) * self.head_dim * elem;
        (offset, positions * self.head_dim * elem)
    }

    fn check_range(&self, start: usize, positions: usize) -> Result<(), CacheError> {
        if start + positions > self.seq_capacity {
            return Err(CacheError::InsufficientCapacity {
                requested: positions,
                remaining: self.seq_capacity.saturating_sub(start),
            });
        }
        Ok(())
    }

    /// Write `src` into positions `start..start + src.seq_len()` in place.
    ///
    /// Dense buffers only; shape and dtype are validated before any byte is
    /// written, so a failure leaves the storage untouched.
    pub fn write_from(&self, start: usize, src: &HostTensor) -> Result<(), CacheError> {
        self.ensure_repr(CacheRepr::Dense)?;
        if src.dtype() != self.dtype {
            return Err(CacheError::ShapeMismatch(format!(
                "write of {} data into {} cache",
                src.dtype(),
                self.dtype
            )));
        }
        if src.batch() != self.batch || src.heads() != self.heads || src.head_dim() != self.head_dim
        {
            return Err(CacheError::ShapeMismatch(format!(
                "write of [{}, {}, _, {}] into cache of [{}, {}, _, {}]",
                src.batch(),
                src.heads(),
                src.head_dim(),
                self.batch,
                self.heads,
                self.head_dim
            )));
        }
        self.check_range(start, src.seq_len())?;

        let mut bytes = self.arena.write();
        for b in 0..self.batch {
            for h in 0..self.heads {
                let (offset, chunk_len) = self.row_chunk_bounds(b, h, start, src.seq_len());
                bytes[offset..offset + chunk_len].copy_from_slice(src.row(b, h));
            }
        }
        Ok(())
    }

    /// Copy the first `positions` positions of `src` into this buffer.
    ///
    /// Raw byte copy, valid for both representations; growth uses it to
    /// carry prior contents (including quantized bytes) forward.
    pub fn copy_prefix_from(&self, src: &CacheBuffer, positions: usize) -> Result<(), CacheError> {
        if Arc::ptr_eq(&self.arena, &src.arena) {
            return Err(CacheError::ShapeMismatch(
                "prefix copy within the same storage".into(),
            ));
        }
        if src.batch != self.batch
            || src.heads != self.heads
            || src.head_dim != self.head_dim
            || src.dtype != self.dtype
        {
            return Err(CacheError::ShapeMismatch(
                "prefix copy between incompatible cache buffers".into(),
            ));
        }
        self.check_range(0, positions)?;
        src.check_range(0, positions)?;

        let src_bytes = src.arena.read();
        let mut dst_bytes = self.arena.write();
        for b in 0..self.batch {
            for h in 0..self.heads {
                let (src_off, chunk_len) = src.row_chunk_bounds(b, h, 0, positions);
                let (dst_off, _) = self.row_chunk_bounds(b, h, 0, positions);
                dst_bytes[dst_off..dst_off + chunk_len]
                    .copy_from_slice(&src_bytes[src_off..src_off + chunk_len]);
            }
        }
        Ok(())
    }

    /// Read the logical contents back into a host tensor. Dense only.
    pub fn to_host(&self) -> Result<HostTensor, CacheError> {
        self.ensure_repr(CacheRepr::Dense)?;
        let mut out = HostTensor::zeros(self.dtype, self.batch, self.heads, self.len, self.head_dim)?;
        let bytes = self.arena.read();
        for b in 0..self.batch {
            for h in 0..self.heads {
                let (offset, chunk_len) = self.row_chunk_bounds(b, h, 0, self.len);
                out.row_mut(b, h).copy_from_slice(&bytes[offset..offset + chunk_len]);
            }
        }
        Ok(out)
    }

    /// Read-only view of positions `start..start + positions`.
    pub fn region(&self, start: usize, positions: usize) -> Result<CacheRegion<'_>, CacheError> {
        self.check_range(start, positions)?;
        Ok(CacheRegion {
            guard: self.arena.read(),
            geom: RegionGeometry::of(self, start, positions),
        })
    }

    /// Writable view of positions `start..start + positions`.
    pub fn region_mut(
        &self,
        start: usize,
        positions: usize,
    ) -> Result<CacheRegionMut<'_>, CacheError> {
        self.check_range(start, positions)?;
        Ok(CacheRegionMut {
            guard: self.arena.write(),
            geom: RegionGeometry::of(self, start, positions),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct RegionGeometry {
    batch: usize,
    heads: usize,
    head_dim: usize,
    seq_capacity: usize,
    start: usize,
    positions: usize,
    elem_size: usize,
}

impl RegionGeometry {
    fn of(buffer: &CacheBuffer, start: usize, positions: usize) -> Self {
        Self {
            batch: buffer.batch,
            heads: buffer.heads,
            head_dim: buffer.head_dim,
            seq_capacity: buffer.seq_capacity,
            start,
            positions,
            elem_size: buffer.dtype.size_in_bytes(),
        }
    }

    fn chunk_bounds(&self, b: usize, h: usize) -> (usize, usize) {
        let offset =
            ((b * self.heads + h) * self.seq_capacity + self.start) * self.head_dim * self.elem_size;
        (offset, self.positions * self.head_dim * self.elem_size)
    }
}

/// Read-only sub-range of a cache buffer, one contiguous chunk per
/// `(batch, head)` row. Holds the storage lock while alive.
pub struct CacheRegion<'a> {
    guard: RwLockReadGuard<'a, Vec<u8>>,
    geom: RegionGeometry,
}

impl CacheRegion<'_> {
    pub fn batch(&self) -> usize {
        self.geom.batch
    }

    pub fn heads(&self) -> usize {
        self.geom.heads
    }

    pub fn head_dim(&self) -> usize {
        self.geom.head_dim
    }

    pub fn positions(&self) -> usize {
        self.geom.positions
    }

    /// Bytes of the `(b, h)` chunk: `positions * head_dim` elements.
    pub fn chunk(&self, b: usize, h: usize) -> &[u8] {
        let (offset, len) = self.geom.chunk_bounds(b, h);
        &self.guard[offset..offset + len]
    }
}

/// Writable sub-range of a cache buffer; the quantize kernel's destination.
pub struct CacheRegionMut<'a> {
    guard: RwLockWriteGuard<'a, Vec<u8>>,
    geom: RegionGeometry,
}

impl CacheRegionMut<'_> {
    pub fn batch(&self) -> usize {
        self.geom.batch
    }

    pub fn heads(&self) -> usize {
        self.geom.heads
    }

    pub fn head_dim(&self) -> usize {
        self.geom.head_dim
    }

    pub fn positions(&self) -> usize {
        self.geom.positions
    }

    pub fn chunk_mut(&mut self, b: usize, h: usize) -> &mut [u8] {
        let (offset, len) = self.geom.chunk_bounds(b, h);
        &mut self.guard[offset..offset + len]
    }
}

/// The (key, value) buffer pair for one decoder layer.
///
/// The two buffers share their logical length and representation; head
/// dimensions may differ in the asymmetric quantized case.
#[derive(Debug, Clone)]
pub struct CachePair {
    pub key: CacheBuffer,
    pub value: CacheBuffer,
}

impl CachePair {
    pub fn new(key: CacheBuffer, value: CacheBuffer) -> Result<Self, CacheError> {
        if key.len() != value.len() {
            return Err(CacheError::ShapeMismatch(format!(
                "key length {} differs from value length {}",
                key.len(),
                value.len()
            )));
        }
        if key.repr() != value.repr() {
            return Err(CacheError::RepresentationMismatch {
                expected: key.repr(),
                actual: value.repr(),
            });
        }
        if key.batch() != value.batch() || key.heads() != value.heads() {
            return Err(CacheError::ShapeMismatch(
                "key and value buffers disagree on batch or head count".into(),
            ));
        }
        Ok(Self { key, value })
    }

    /// Shared logical length of the pair.
    pub fn len(&self) -> usize {
        self.key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }

    pub fn repr(&self) -> CacheRepr {
        self.key.repr()
    }

    pub fn ensure_repr(&self, expected: CacheRepr) -> Result<(), CacheError> {
        self.key.ensure_repr(expected)?;
        self.value.ensure_repr(expected)
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
