//! Quantization kernel seam.
//!
//! The cache manager owns memory layout and invocation points; the
//! quantize/dequantize math belongs to hardware-specific kernels behind
//! [`QuantizeKernel`]. [`E5m2Kernel`] is the host reference implementation.

use crate::cache::{CacheError, CacheRegion, CacheRegionMut};
use crate::tensor::HostTensor;

pub mod e5m2;

pub use e5m2::E5m2Kernel;

/// A quantize/dequantize kernel operating on cache byte regions.
///
/// `quantize` encodes a step's key/value states directly into the newly
/// exposed cache region; `dequantize` decodes cached regions into dense
/// output tensors. Implementations must fully populate their destinations
/// or fail without the caller observing a partial write.
pub trait QuantizeKernel {
    fn quantize(
        &self,
        keys: &HostTensor,
        values: &HostTensor,
        k_dst: &mut CacheRegionMut<'_>,
        v_dst: &mut CacheRegionMut<'_>,
    ) -> Result<(), CacheError>;

    fn dequantize(
        &self,
        k_src: &CacheRegion<'_>,
        v_src: &CacheRegion<'_>,
        keys_out: &mut HostTensor,
        values_out: &mut HostTensor,
    ) -> Result<(), CacheError>;
}
