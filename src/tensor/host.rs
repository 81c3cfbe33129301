//! Dense host-side tensors in `[batch, heads, seq, head_dim]` layout.
//!
//! Used for the per-step key/value states appended into the cache and for
//! the dequantized outputs of a cache restore. Rows (one `(batch, head)`
//! slice covering all positions) are contiguous.

use crate::cache::CacheError;

use super::dtype::{decode_f32, encode_f32, DType};

/// A dense, contiguous `[batch, heads, seq, head_dim]` tensor on the host.
#[derive(Debug, Clone)]
pub struct HostTensor {
    dtype: DType,
    batch: usize,
    heads: usize,
    seq: usize,
    head_dim: usize,
    data: Vec<u8>,
}

impl HostTensor {
    /// Allocate a zero-filled tensor.
    pub fn zeros(
        dtype: DType,
        batch: usize,
        heads: usize,
        seq: usize,
        head_dim: usize,
    ) -> Result<Self, CacheError> {
        if !dtype.is_dense() {
            return Err(CacheError::UnsupportedConfiguration(format!(
                "host tensors hold dense scalars, not {dtype}"
            )));
        }
        if batch == 0 || heads == 0 || head_dim == 0 {
            return Err(CacheError::ShapeMismatch(format!(
                "degenerate tensor shape [{batch}, {heads}, {seq}, {head_dim}]"
            )));
        }
        let bytes = batch * heads * seq * head_dim * dtype.size_in_bytes();
        Ok(Self {
            dtype,
            batch,
            heads,
            seq,
            head_dim,
            data: vec![0u8; bytes],
        })
    }

    /// Build a tensor from f32 scalars, encoding into `dtype`.
    ///
    /// `values` is row-major `[batch, heads, seq, head_dim]` and must hold
    /// exactly `batch * heads * seq * head_dim` scalars.
    pub fn from_f32(
        dtype: DType,
        batch: usize,
        heads: usize,
        seq: usize,
        head_dim: usize,
        values: &[f32],
    ) -> Result<Self, CacheError> {
        let mut t = Self::zeros(dtype, batch, heads, seq, head_dim)?;
        if values.len() != t.elem_count() {
            return Err(CacheError::ShapeMismatch(format!(
                "{} scalars for shape [{batch}, {heads}, {seq}, {head_dim}]",
                values.len()
            )));
        }
        encode_f32(dtype, values, &mut t.data)?;
        Ok(t)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn heads(&self) -> usize {
        self.heads
    }

    /// Number of positions along the sequence axis.
    pub fn seq_len(&self) -> usize {
        self.seq
    }

    pub fn head_dim(&self) -> usize {
        self.head_dim
    }

    pub fn elem_count(&self) -> usize {
        self.batch * self.heads * self.seq * self.head_dim
    }

    fn row_bytes_len(&self) -> usize {
        self.seq * self.head_dim * self.dtype.size_in_bytes()
    }

    fn row_offset(&self, b: usize, h: usize) -> usize {
        (b * self.heads + h) * self.row_bytes_len()
    }

    /// Raw bytes of the `(b, h)` row: all positions, contiguous.
    pub fn row(&self, b: usize, h: usize) -> &[u8] {
        let off = self.row_offset(b, h);
        &self.data[off..off + self.row_bytes_len()]
    }

    pub fn row_mut(&mut self, b: usize, h: usize) -> &mut [u8] {
        let off = self.row_offset(b, h);
        let len = self.row_bytes_len();
        &mut self.data[off..off + len]
    }

    /// Decode the `(b, h)` row to f32 scalars.
    pub fn row_f32(&self, b: usize, h: usize) -> Result<Vec<f32>, CacheError> {
        let mut out = vec![0f32; self.seq * self.head_dim];
        decode_f32(self.dtype, self.row(b, h), &mut out)?;
        Ok(out)
    }

    /// Encode f32 scalars into the `(b, h)` row.
    pub fn write_row_f32(&mut self, b: usize, h: usize, values: &[f32]) -> Result<(), CacheError> {
        let dtype = self.dtype;
        encode_f32(dtype, values, self.row_mut(b, h))
    }

    /// Decode the whole tensor to f32, row-major.
    pub fn to_f32(&self) -> Result<Vec<f32>, CacheError> {
        let mut out = vec![0f32; self.elem_count()];
        decode_f32(self.dtype, &self.data, &mut out)?;
        Ok(out)
    }

    pub(crate) fn raw(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
