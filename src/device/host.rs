// Copyright 2024-2026 xpu-kv-cache Contributors
// Licensed under the Apache License, Version 2.0

//! Host-memory reference device.
//!
//! Backs cache storage with plain host allocations. An optional byte budget
//! makes allocation failure reproducible, which is how the out-of-memory
//! path is exercised without accelerator hardware.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::cache::CacheError;
use crate::tensor::{Arena, ArenaRef, Reservation};

use super::capability::MemoryClass;
use super::Device;

/// A device backed by host memory.
pub struct HostDevice {
    family: String,
    memory_class: MemoryClass,
    budget: Option<usize>,
    in_use: Arc<AtomicUsize>,
    reclaim_calls: AtomicU64,
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HostDevice {
    /// Plain host device, unlimited budget.
    pub fn new() -> Self {
        Self::with_family("host", MemoryClass::Host)
    }

    /// Host-backed stand-in for an accelerator family, used to exercise
    /// family-dependent behavior.
    pub fn with_family(family: &str, memory_class: MemoryClass) -> Self {
        Self {
            family: family.to_string(),
            memory_class,
            budget: None,
            in_use: Arc::new(AtomicUsize::new(0)),
            reclaim_calls: AtomicU64::new(0),
        }
    }

    /// Cap total outstanding allocations at `bytes`.
    pub fn with_budget(mut self, bytes: usize) -> Self {
        self.budget = Some(bytes);
        self
    }

    /// Bytes currently backing live arenas.
    pub fn bytes_in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    /// Number of reclaim hints received.
    pub fn reclaim_calls(&self) -> u64 {
        self.reclaim_calls.load(Ordering::SeqCst)
    }
}

impl Device for HostDevice {
    fn family(&self) -> &str {
        &self.family
    }

    fn memory_class(&self) -> MemoryClass {
        self.memory_class
    }

    fn alloc(&self, bytes: usize) -> Result<ArenaRef, CacheError> {
        if let Some(budget) = self.budget {
            let used = self.in_use.load(Ordering::SeqCst);
            if used + bytes > budget {
                tracing::warn!(
                    device = %self.family,
                    requested = bytes,
                    in_use = used,
                    budget,
                    "allocation exceeds device budget"
                );
                return Err(CacheError::Allocation {
                    requested: bytes,
                    device: self.family.clone(),
                    reason: format!("budget {budget} bytes exceeded with {used} in use"),
                });
            }
        }
        let reservation = Reservation::new(Arc::clone(&self.in_use), bytes);
        Ok(Arena::new(bytes, Some(reservation)))
    }

    fn reclaim_cached_memory(&self) {
        // Host memory has no allocator cache; count the hint for observability.
        self.reclaim_calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(device = %self.family, "cached-memory reclaim hint");
    }
}

#[cfg(test)]
#[path = "host_device_tests.rs"]
mod tests;
