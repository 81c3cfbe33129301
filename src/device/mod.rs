// Copyright 2024-2026 xpu-kv-cache Contributors
// Licensed under the Apache License, Version 2.0

//! Device abstraction: compute-target identity, memory class, allocation,
//! and the best-effort cached-memory reclaim hook.

use crate::cache::CacheError;
use crate::tensor::ArenaRef;

pub mod capability;
pub mod host;

pub use capability::{CapabilityTable, DeviceCaps, MemoryClass, QuantRule};
pub use host::HostDevice;

/// A compute target the cache manager allocates on.
///
/// The manager needs very little from a device: a family name for
/// capability lookups, a memory class for constrained-memory hints, raw
/// storage allocation, and an optional hook that releases device-side
/// allocator caches before a large allocation.
pub trait Device {
    /// Device family name, the key into a [`CapabilityTable`].
    fn family(&self) -> &str;

    /// Memory class driving constrained-memory behavior.
    fn memory_class(&self) -> MemoryClass;

    /// Allocate `bytes` of zero-initialized storage.
    ///
    /// Fails with [`CacheError::Allocation`] when the device cannot satisfy
    /// the request. The manager never retries a failed allocation.
    fn alloc(&self, bytes: usize) -> Result<ArenaRef, CacheError>;

    /// Best-effort release of device-side cached/scratch memory.
    ///
    /// Called before growth allocations under a constrained-memory hint to
    /// reduce fragmentation-driven failures. Not a guarantee.
    fn reclaim_cached_memory(&self) {}
}
