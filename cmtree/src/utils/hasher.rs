//! Hashing utilities for the Merkle tree.
//!
//! This module provides:
//! - [`DigestOps`], the pluggable digest seam used by the tree
//! - [`Sha256Ops`], the default SHA-256 implementation
//! - free functions for hashing single values and node pairs
//! - hex conversion helpers for the canonical text form of a digest

use auto_impl::auto_impl;
use sha2::{Digest, Sha256};

use crate::def::HASH_LEN;

/// Type alias for a 32-byte hash value.
/// Used throughout the crate for leaf and node digests.
pub type Hash32 = [u8; HASH_LEN];

/// The digest function used by a tree.
///
/// `hash` turns a leaf value into a digest; `combine` produces a parent
/// digest from its left and right children, in that order.
#[auto_impl(&, Arc)]
pub trait DigestOps: Send + Sync {
    /// Hashes raw bytes into a digest.
    fn hash(&self, data: &[u8]) -> Hash32;

    /// Combines a left and a right child digest into the parent digest.
    fn combine(&self, left: &Hash32, right: &Hash32) -> Hash32;
}

/// SHA-256 over the raw bytes, and SHA-256 over `left || right` for pairs.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Ops;

impl DigestOps for Sha256Ops {
    fn hash(&self, data: &[u8]) -> Hash32 {
        hash(data)
    }

    fn combine(&self, left: &Hash32, right: &Hash32) -> Hash32 {
        hash2(left, right)
    }
}

/// Computes the SHA-256 hash of a single value.
///
/// # Arguments
/// * `a` - Value to hash
///
/// # Returns
/// The 32-byte hash of the input
pub fn hash<T: AsRef<[u8]>>(a: T) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.finalize().into()
}

/// Computes the SHA-256 hash of two values concatenated.
///
/// This is the parent digest of a Merkle node whose children are `a`
/// (left) and `b` (right).
pub fn hash2<T: AsRef<[u8]>>(a: T, b: T) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

/// Lowercase hex form of a digest.
pub fn to_hex(h: &Hash32) -> String {
    hex::encode(h)
}

/// Parses a 64-character hex string back into a digest.
///
/// Returns `None` if the string is not valid hex or has the wrong length.
pub fn from_hex(s: &str) -> Option<Hash32> {
    let bz = hex::decode(s).ok()?;
    bz.try_into().ok()
}
