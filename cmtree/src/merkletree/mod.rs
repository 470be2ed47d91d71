//! Binary Merkle tree with inclusion proofs and concurrent batch updates.
//!
//! - [`MerkleTree`]: construction, lookups, proofs and updates
//! - [`node`]: arena-allocated tree vertices
//! - [`proof`]: proof entries and stateless proof checking
//! - [`updater`]: sequential and concurrent batch updates
//! - [`check`]: invariant checks used after updates and in tests

pub mod check;
pub mod node;
pub mod proof;
pub mod tree;
pub mod updater;

pub use proof::{Direction, ProofEntry};
pub use tree::{Leaf, LeafUpdate, MerkleTree, NodeSnapshot};
