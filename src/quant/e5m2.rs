//! Host reference e5m2 kernel.
//!
//! Encodes each scalar as the top byte of its f16 representation (5
//! exponent bits, 2 mantissa bits) with round-to-nearest-even, and decodes
//! by zero-extending back to f16. Matches the one-byte-per-scalar storage
//! contract of the quantized cache; hardware kernels replace this on
//! device.

use half::f16;

use crate::cache::{CacheError, CacheRegion, CacheRegionMut};
use crate::tensor::HostTensor;

use super::QuantizeKernel;

/// Reference 8-bit float (e5m2) codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct E5m2Kernel;

pub(crate) fn f32_to_e5m2(x: f32) -> u8 {
    let bits = f16::from_f32(x).to_bits();
    // Round to nearest even while truncating the low 8 bits; saturating add
    // keeps NaN/inf encodings in the top byte intact.
    let lsb = (bits >> 8) & 1;
    let rounded = u32::from(bits) + 0x7F + u32::from(lsb);
    (rounded.min(u32::from(u16::MAX)) >> 8) as u8
}

pub(crate) fn e5m2_to_f32(byte: u8) -> f32 {
    f16::from_bits(u16::from(byte) << 8).to_f32()
}

impl E5m2Kernel {
    fn encode_tensor(src: &HostTensor, dst: &mut CacheRegionMut<'_>) -> Result<(), CacheError> {
        check_geometry(
            src.batch(),
            src.heads(),
            src.seq_len(),
            src.head_dim(),
            dst.batch(),
            dst.heads(),
            dst.positions(),
            dst.head_dim(),
        )?;
        for b in 0..src.batch() {
            for h in 0..src.heads() {
                let row = src.row_f32(b, h)?;
                let chunk = dst.chunk_mut(b, h);
                for (out, &x) in chunk.iter_mut().zip(row.iter()) {
                    *out = f32_to_e5m2(x);
                }
            }
        }
        Ok(())
    }

    fn decode_tensor(src: &CacheRegion<'_>, dst: &mut HostTensor) -> Result<(), CacheError> {
        check_geometry(
            dst.batch(),
            dst.heads(),
            dst.seq_len(),
            dst.head_dim(),
            src.batch(),
            src.heads(),
            src.positions(),
            src.head_dim(),
        )?;
        let mut row = vec![0f32; src.positions() * src.head_dim()];
        for b in 0..dst.batch() {
            for h in 0..dst.heads() {
                for (out, &byte) in row.iter_mut().zip(src.chunk(b, h).iter()) {
                    *out = e5m2_to_f32(byte);
                }
                dst.write_row_f32(b, h, &row)?;
            }
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn check_geometry(
    t_batch: usize,
    t_heads: usize,
    t_seq: usize,
    t_dim: usize,
    r_batch: usize,
    r_heads: usize,
    r_positions: usize,
    r_dim: usize,
) -> Result<(), CacheError> {
    if t_batch != r_batch || t_heads != r_heads || t_seq != r_positions || t_dim != r_dim {
        return Err(CacheError::Kernel(format!(
            "tensor [{t_batch}, {t_heads}, {t_seq}, {t_dim}] does not match \
             region [{r_batch}, {r_heads}, {r_positions}, {r_dim}]"
        )));
    }
    Ok(())
}

impl QuantizeKernel for E5m2Kernel {
    fn quantize(
        &self,
        keys: &HostTensor,
        values: &HostTensor,
        k_dst: &mut CacheRegionMut<'_>,
        v_dst: &mut CacheRegionMut<'_>,
    ) -> Result<(), CacheError> {
        Self::encode_tensor(keys, k_dst)?;
        Self::encode_tensor(values, v_dst)
    }

    fn dequantize(
        &self,
        k_src: &CacheRegion<'_>,
        v_src: &CacheRegion<'_>,
        keys_out: &mut HostTensor,
        values_out: &mut HostTensor,
    ) -> Result<(), CacheError> {
        Self::decode_tensor(k_src, keys_out)?;
        Self::decode_tensor(v_src, values_out)
    }
}

#[cfg(test)]
#[path = "e5m2_tests.rs"]
mod tests;
