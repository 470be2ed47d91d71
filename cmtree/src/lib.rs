//! A binary Merkle tree over an ordered list of strings.
//!
//! # Overview
//! The tree provides:
//! - Construction by bottom-up pairing, with the last node of an odd level
//!   paired with itself
//! - Inclusion proofs for any leaf value, and their verification against the
//!   current root
//! - Batch updates of leaf values, run either sequentially or as one job per
//!   leaf on a caller-supplied [`Scheduler`]
//!
//! # Concurrent updates
//! Concurrent jobs of one batch meet only at conflict nodes, the lowest
//! common ancestors of index-adjacent modified leaves. A one-bit rendezvous
//! at each conflict node lets the second arriving job finish it, so no
//! ancestor is recomputed from a half-updated child and none is recomputed
//! twice. Separate update calls are serialized by a tree-wide lock.
//!
//! # Example Usage
//! ```
//! use cmtree::{MerkleTree, config::Config};
//!
//! let tree = MerkleTree::new(&["A", "B", "C", "D", "E"]).unwrap();
//! let pool = Config::default().build_thread_pool();
//!
//! let a = tree.find_leaf("A").unwrap();
//! let d = tree.find_leaf("D").unwrap();
//! tree.update_leaves(vec![a.with_value("a"), d.with_value("d")], Some(&pool))
//!     .unwrap();
//!
//! let proof = tree.get_proof("d");
//! assert!(tree.verify_proof("d", &proof));
//! ```

pub mod config;
pub mod def;
pub mod error;
pub mod merkletree;
pub mod scheduler;
pub mod utils;

// for test
pub mod test_helper;

pub use error::TreeError;
pub use merkletree::{Direction, Leaf, LeafUpdate, MerkleTree, NodeSnapshot, ProofEntry};
pub use scheduler::Scheduler;
pub use utils::hasher::{DigestOps, Hash32, Sha256Ops};
