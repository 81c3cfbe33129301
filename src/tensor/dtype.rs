//! Cache element types and scalar codecs.

use std::fmt;

use half::f16;

use crate::cache::CacheError;

/// Element type of a cache buffer or host tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    /// 32-bit float.
    F32,
    /// 16-bit float (IEEE half).
    F16,
    /// One quantized byte per scalar. Only meaningful inside a quantized
    /// cache buffer; the encoding is owned by the quantize kernel.
    U8,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
            DType::U8 => 1,
        }
    }

    /// Whether this type carries plain (non-quantized) scalars.
    pub fn is_dense(&self) -> bool {
        !matches!(self, DType::U8)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F16 => write!(f, "f16"),
            DType::U8 => write!(f, "u8"),
        }
    }
}

/// Encode f32 scalars into `dtype`-typed little-endian bytes.
///
/// `dst` must hold exactly `src.len() * dtype.size_in_bytes()` bytes.
pub fn encode_f32(dtype: DType, src: &[f32], dst: &mut [u8]) -> Result<(), CacheError> {
    if dst.len() != src.len() * dtype.size_in_bytes() {
        return Err(CacheError::ShapeMismatch(format!(
            "encode of {} scalars into {} bytes as {}",
            src.len(),
            dst.len(),
            dtype
        )));
    }
    match dtype {
        DType::F32 => {
            for (chunk, &x) in dst.chunks_exact_mut(4).zip(src) {
                chunk.copy_from_slice(&x.to_le_bytes());
            }
        }
        DType::F16 => {
            for (chunk, &x) in dst.chunks_exact_mut(2).zip(src) {
                chunk.copy_from_slice(&f16::from_f32(x).to_le_bytes());
            }
        }
        DType::U8 => {
            return Err(CacheError::UnsupportedConfiguration(
                "quantized bytes have no scalar codec; use a quantize kernel".into(),
            ));
        }
    }
    Ok(())
}

/// Decode `dtype`-typed little-endian bytes into f32 scalars.
///
/// `src` must hold exactly `dst.len() * dtype.size_in_bytes()` bytes.
pub fn decode_f32(dtype: DType, src: &[u8], dst: &mut [f32]) -> Result<(), CacheError> {
    if src.len() != dst.len() * dtype.size_in_bytes() {
        return Err(CacheError::ShapeMismatch(format!(
            "decode of {} bytes into {} scalars as {}",
            src.len(),
            dst.len(),
            dtype
        )));
    }
    match dtype {
        DType::F32 => {
            for (chunk, out) in src.chunks_exact(4).zip(dst) {
                *out = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            }
        }
        DType::F16 => {
            for (chunk, out) in src.chunks_exact(2).zip(dst) {
                *out = f16::from_le_bytes([chunk[0], chunk[1]]).to_f32();
            }
        }
        DType::U8 => {
            return Err(CacheError::UnsupportedConfiguration(
                "quantized bytes have no scalar codec; use a quantize kernel".into(),
            ));
        }
    }
    Ok(())
}
