//! Verification utilities for Merkle tree consistency checking.
//!
//! The checks ensure that:
//! 1. Every internal node's digest combines its children's digests
//! 2. Every leaf's digest is the hash of its current value
//! 3. Parent and child links agree and only the root lacks a parent
//! 4. Leaf indices match their positions
//! 5. No batch state (visited flags, conflict nodes) outlives an update
//!
//! A failed check means the update protocol has a bug, so every function
//! here panics instead of returning an error.

use super::node::{NodeId, NodeKind, TreeNode};
use crate::utils::hasher::{DigestOps, Hash32};

/// Verifies that two digests are equal.
///
/// # Panics
/// Panics with `tag` in the message if they differ.
pub fn hash_equal(tag: &str, a: &[u8], b: &[u8]) {
    if !a.eq(b) {
        panic!(
            "{} Not Equal: {} vs {}",
            tag,
            hex::encode(a),
            hex::encode(b)
        );
    }
}

/// Verifies digests and parent links of every node below `root`.
///
/// # Panics
/// Panics on the first node whose digest or parent link is wrong.
pub fn check_hash_consistency<D: DigestOps>(ops: &D, nodes: &[TreeNode], root: NodeId) {
    if nodes[root].parent.is_some() {
        panic!("root {} has a parent", root);
    }
    for (id, node) in nodes.iter().enumerate() {
        match &node.kind {
            NodeKind::Leaf { value, .. } => {
                let expected = ops.hash(value.read().as_bytes());
                hash_equal(&format!("Leaf-{}", id), &node.digest(), &expected);
            }
            NodeKind::Internal { left, right } => {
                let expected = ops.combine(&nodes[*left].digest(), &nodes[*right].digest());
                hash_equal(&format!("Node-{}", id), &node.digest(), &expected);
                if nodes[*left].parent != Some(id) || nodes[*right].parent != Some(id) {
                    panic!("Mismatch at {} l:{} r:{}", id, left, right);
                }
            }
        }
        if id != root && node.parent.is_none() {
            panic!("node {} is detached from the tree", id);
        }
    }
}

/// Verifies that leaf `i` sits at arena slot `i` for every leaf.
///
/// # Panics
/// Panics if a slot below `leaf_count` is not a leaf or has another index.
pub fn check_leaf_indices(nodes: &[TreeNode], leaf_count: usize) {
    for (i, node) in nodes.iter().enumerate().take(leaf_count) {
        match node.kind {
            NodeKind::Leaf { index, .. } if index == i => {}
            _ => panic!("slot {} does not hold leaf {}", i, i),
        }
    }
}

/// Verifies that no visited flag is set and no conflict node is pending.
///
/// # Panics
/// Panics if batch state was left behind.
pub fn check_batch_state_clear(nodes: &[TreeNode], pending_conflicts: usize) {
    if pending_conflicts != 0 {
        panic!("{} conflict nodes left after update", pending_conflicts);
    }
    if let Some(id) = nodes.iter().position(|n| n.is_visited()) {
        panic!("node {} still visited after update", id);
    }
}

/// Recomputes the root digest from the leaf values alone.
pub fn recompute_root<D: DigestOps>(ops: &D, nodes: &[TreeNode], root: NodeId) -> Hash32 {
    match &nodes[root].kind {
        NodeKind::Leaf { value, .. } => ops.hash(value.read().as_bytes()),
        NodeKind::Internal { left, right } => {
            let l = recompute_root(ops, nodes, *left);
            let r = if left == right {
                l
            } else {
                recompute_root(ops, nodes, *right)
            };
            ops.combine(&l, &r)
        }
    }
}
