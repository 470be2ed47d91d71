//! Utility types and functions for the Merkle tree.
//!
//! This module provides:
//! - Hashing functions and the digest seam
//! - A process-unique id generator for trees

pub mod hasher;

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Returns an id that no other tree in this process has been given.
///
/// Leaf handles carry it so a handle from one tree is never mistaken
/// for a leaf of another.
pub fn next_tree_id() -> u64 {
    NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed)
}
