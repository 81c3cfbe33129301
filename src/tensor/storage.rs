//! Reference-counted byte arenas backing cache buffers.
//!
//! An arena is the unit of storage allocation: cache views share one arena
//! and differ only in their advertised logical length, so appending within
//! capacity never moves memory. Growth allocates a fresh arena and the old
//! one is reclaimed once the last view over it is dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared handle to an arena.
pub type ArenaRef = Arc<Arena>;

/// Device-budget accounting held for the lifetime of an arena.
///
/// Dropping the reservation returns the bytes to the owning device's budget,
/// which is how superseded storage becomes eligible for reclamation.
#[derive(Debug)]
pub struct Reservation {
    counter: Arc<AtomicUsize>,
    bytes: usize,
}

impl Reservation {
    pub fn new(counter: Arc<AtomicUsize>, bytes: usize) -> Self {
        counter.fetch_add(bytes, Ordering::SeqCst);
        Self { counter, bytes }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.counter.fetch_sub(self.bytes, Ordering::SeqCst);
    }
}

/// A fixed-size, zero-initialized byte allocation.
#[derive(Debug)]
pub struct Arena {
    bytes: RwLock<Vec<u8>>,
    len: usize,
    _reservation: Option<Reservation>,
}

impl Arena {
    /// Allocate an arena of `len` bytes, optionally charged to a device budget.
    pub fn new(len: usize, reservation: Option<Reservation>) -> ArenaRef {
        Arc::new(Self {
            bytes: RwLock::new(vec![0u8; len]),
            len,
            _reservation: reservation,
        })
    }

    /// Allocated size in bytes. Fixed for the arena's lifetime.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.bytes.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.bytes.write()
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
