//! Tree vertices and the arena that owns them.
//!
//! Nodes live in a flat `Vec` owned by the tree and refer to each other by
//! [`NodeId`]. A node's parent is a plain index, so there is no second
//! owning pointer and no reference cycle. Leaves occupy the first `n` slots
//! in input order, which makes a leaf's arena slot equal to its index.
//!
//! Each node's digest sits behind its own `RwLock`: readers take the shared
//! side while copying a sibling digest, and update walks take the exclusive
//! side while writing. The `visited` bit is only touched during a batch
//! update, and only for conflict nodes, under that node's rendezvous lock.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::utils::hasher::{DigestOps, Hash32};

/// Position of a node in its tree's arena.
pub type NodeId = usize;

/// What a node holds besides its digest.
#[derive(Debug)]
pub enum NodeKind {
    /// An original data item, at position `index` of the input.
    Leaf { value: RwLock<String>, index: usize },
    /// A parent of two children. `left == right` when the level had odd
    /// length and the last node was paired with itself.
    Internal { left: NodeId, right: NodeId },
}

/// A vertex of the tree.
#[derive(Debug)]
pub struct TreeNode {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    /// Distance from the root, filled in once the whole tree is built.
    pub depth: u32,
    digest: RwLock<Hash32>,
    visited: AtomicBool,
}

impl TreeNode {
    pub fn new_leaf(value: String, index: usize, digest: Hash32) -> Self {
        Self {
            kind: NodeKind::Leaf {
                value: RwLock::new(value),
                index,
            },
            parent: None,
            depth: 0,
            digest: RwLock::new(digest),
            visited: AtomicBool::new(false),
        }
    }

    pub fn new_internal(left: NodeId, right: NodeId, digest: Hash32) -> Self {
        Self {
            kind: NodeKind::Internal { left, right },
            parent: None,
            depth: 0,
            digest: RwLock::new(digest),
            visited: AtomicBool::new(false),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    pub fn digest(&self) -> Hash32 {
        *self.digest.read()
    }

    pub fn set_digest(&self, digest: Hash32) {
        *self.digest.write() = digest;
    }

    /// Current value of a leaf, `None` for internal nodes.
    pub fn value(&self) -> Option<String> {
        match &self.kind {
            NodeKind::Leaf { value, .. } => Some(value.read().clone()),
            NodeKind::Internal { .. } => None,
        }
    }

    pub fn value_eq(&self, other: &str) -> bool {
        match &self.kind {
            NodeKind::Leaf { value, .. } => value.read().as_str() == other,
            NodeKind::Internal { .. } => false,
        }
    }

    /// Replaces a leaf's value without touching its digest.
    ///
    /// Only callers holding the tree-wide write lock may do this, and they
    /// must recompute the digests up to the root before releasing it.
    pub(crate) fn replace_value(&self, new_value: String) {
        if let NodeKind::Leaf { value, .. } = &self.kind {
            *value.write() = new_value;
        }
    }

    pub fn children(&self) -> Option<(NodeId, NodeId)> {
        match self.kind {
            NodeKind::Leaf { .. } => None,
            NodeKind::Internal { left, right } => Some((left, right)),
        }
    }

    pub fn is_visited(&self) -> bool {
        self.visited.load(Ordering::Acquire)
    }

    /// Sets the visited bit and returns its previous value.
    pub(crate) fn mark_visited(&self) -> bool {
        self.visited.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn clear_visited(&self) {
        self.visited.store(false, Ordering::Release);
    }
}

/// Recomputes the digest of `nodes[id]` from its value or its children.
///
/// Returns the new digest.
pub fn rehash<D: DigestOps>(ops: &D, nodes: &[TreeNode], id: NodeId) -> Hash32 {
    let node = &nodes[id];
    let digest = match &node.kind {
        NodeKind::Leaf { value, .. } => ops.hash(value.read().as_bytes()),
        NodeKind::Internal { left, right } => {
            let l = nodes[*left].digest();
            let r = nodes[*right].digest();
            ops.combine(&l, &r)
        }
    };
    node.set_digest(digest);
    digest
}

/// Builds the arena for `data`, returning the nodes and the root's id.
///
/// Leaves come first, then each level of internal nodes from bottom to
/// top. The last node of an odd-length level is paired with itself.
/// `data` must not be empty.
pub fn build_nodes<D: DigestOps, S: AsRef<str>>(ops: &D, data: &[S]) -> (Vec<TreeNode>, NodeId) {
    debug_assert!(!data.is_empty());
    let mut nodes: Vec<TreeNode> = Vec::with_capacity(2 * data.len());
    for (i, v) in data.iter().enumerate() {
        let v = v.as_ref();
        nodes.push(TreeNode::new_leaf(v.to_string(), i, ops.hash(v.as_bytes())));
    }

    let mut level: Vec<NodeId> = (0..nodes.len()).collect();
    while level.len() > 1 {
        let mut next_level = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = *pair.get(1).unwrap_or(&left);
            let digest = ops.combine(&nodes[left].digest(), &nodes[right].digest());
            let id = nodes.len();
            nodes.push(TreeNode::new_internal(left, right, digest));
            nodes[left].parent = Some(id);
            nodes[right].parent = Some(id);
            next_level.push(id);
        }
        level = next_level;
    }
    let root = level[0];

    // parents always sit after their children, so walk from the top down
    for id in (0..nodes.len()).rev() {
        if let Some(p) = nodes[id].parent {
            nodes[id].depth = nodes[p].depth + 1;
        }
    }
    (nodes, root)
}
