//! Tensor and storage primitives the cache manager is built on.
//!
//! - `dtype` — element types and scalar codecs
//! - `storage` — reference-counted, lock-guarded byte arenas
//! - `host` — dense host-side `[batch, heads, seq, head_dim]` tensors

pub mod dtype;
pub mod host;
pub mod storage;

pub use dtype::DType;
pub use host::HostTensor;
pub use storage::{Arena, ArenaRef, Reservation};
