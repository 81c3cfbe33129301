//! Tests for storage arenas and budget reservations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;

#[test]
fn test_arena_zero_filled() {
    let arena = Arena::new(64, None);
    assert_eq!(arena.len(), 64);
    assert!(arena.read().iter().all(|&b| b == 0));
}

#[test]
fn test_views_share_storage() {
    let arena = Arena::new(16, None);
    let view = Arc::clone(&arena);
    arena.write()[3] = 7;
    assert_eq!(view.read()[3], 7);
}

#[test]
fn test_reservation_released_on_drop() {
    let counter = Arc::new(AtomicUsize::new(0));
    let arena = Arena::new(128, Some(Reservation::new(Arc::clone(&counter), 128)));
    assert_eq!(counter.load(Ordering::SeqCst), 128);
    drop(arena);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn test_reservation_survives_while_any_view_lives() {
    let counter = Arc::new(AtomicUsize::new(0));
    let arena = Arena::new(32, Some(Reservation::new(Arc::clone(&counter), 32)));
    let view = Arc::clone(&arena);
    drop(arena);
    // The view still pins the arena and its reservation.
    assert_eq!(counter.load(Ordering::SeqCst), 32);
    drop(view);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}
