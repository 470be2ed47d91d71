//! The Merkle tree: construction, lookups and inclusion proofs.
//!
//! Batch updates live in [`super::updater`]; this module owns the shared
//! state they operate on.

use std::fmt;
use std::sync::Arc;

use crossbeam::channel::Receiver;
use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use super::check;
use super::node::{build_nodes, NodeId, TreeNode};
use super::proof::{self, Direction, ProofEntry};
use crate::config::Config;
use crate::error::TreeError;
use crate::utils::hasher::{self, DigestOps, Hash32, Sha256Ops};
use crate::utils::next_tree_id;

/// Handle to one leaf of a specific tree.
///
/// Handles are cheap to copy and stay valid for the tree's lifetime since
/// leaves are never added or removed. A handle taken from one tree is
/// ignored by every other tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Leaf {
    pub(crate) tree_id: u64,
    pub(crate) index: usize,
}

impl Leaf {
    /// Position of this leaf in the data the tree was built from.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Pairs this leaf with the value it should hold after an update.
    pub fn with_value<S: Into<String>>(self, value: S) -> LeafUpdate {
        LeafUpdate {
            leaf: self,
            value: value.into(),
        }
    }
}

/// A leaf together with its replacement value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafUpdate {
    pub leaf: Leaf,
    pub value: String,
}

/// A copy of one node's state, detached from the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub digest: Hash32,
    /// Set for leaves only.
    pub value: Option<String>,
    /// Left and right child digests, for internal nodes only.
    pub children: Option<(Hash32, Hash32)>,
}

impl fmt::Display for NodeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node{{")?;
        if let Some(value) = &self.value {
            write!(f, "value = {}, ", value)?;
        }
        if let Some((l, r)) = &self.children {
            write!(
                f,
                "left hash = {}, right hash = {}, ",
                hasher::to_hex(l),
                hasher::to_hex(r)
            )?;
        }
        write!(f, "hash = {}}}", hasher::to_hex(&self.digest))
    }
}

/// State shared between a tree handle and the work units of a batch.
pub(crate) struct TreeCore<D> {
    pub(crate) id: u64,
    pub(crate) ops: D,
    pub(crate) config: Config,
    pub(crate) nodes: Vec<TreeNode>,
    pub(crate) root: NodeId,
    pub(crate) leaf_count: usize,
    /// Shared by readers, exclusive for the whole of an update call.
    pub(crate) lock: RwLock<()>,
    /// Rendezvous locks of the current batch's conflict nodes.
    pub(crate) conflict_nodes: DashMap<NodeId, Mutex<()>>,
    /// A batch that timed out, kept until `reset`.
    pub(crate) stalled: Mutex<Option<StalledBatch>>,
}

/// What is left of a timed-out batch.
pub(crate) struct StalledBatch {
    /// Completion channel shared with the batch's outstanding jobs.
    pub(crate) done: Receiver<NodeId>,
    pub(crate) completed: usize,
    pub(crate) submitted: usize,
    /// Root digest from before the batch started.
    pub(crate) committed_root: Hash32,
}

impl<D> TreeCore<D> {
    pub(crate) fn is_stalled(&self) -> bool {
        self.stalled.lock().is_some()
    }

    /// The last root digest a completed write produced.
    pub(crate) fn committed_root(&self) -> Hash32 {
        match self.stalled.lock().as_ref() {
            Some(batch) => batch.committed_root,
            None => self.nodes[self.root].digest(),
        }
    }
}

impl<D: DigestOps> TreeCore<D> {
    /// First leaf, by index, whose value equals `value`.
    pub(crate) fn find_leaf_id(&self, value: &str) -> Option<NodeId> {
        (0..self.leaf_count).find(|&i| self.nodes[i].value_eq(value))
    }

    pub(crate) fn check_all(&self) {
        check::check_hash_consistency(&self.ops, &self.nodes, self.root);
        check::check_leaf_indices(&self.nodes, self.leaf_count);
        check::check_batch_state_clear(&self.nodes, self.conflict_nodes.len());
    }
}

/// A binary Merkle tree over an ordered list of strings.
///
/// Cloning the tree clones a handle; all clones share the same nodes.
/// Reads may run from many threads at once; an update excludes every other
/// read and update for its whole duration.
///
/// After a batch times out, leaf values and digests are no longer in step.
/// Until [`MerkleTree::reset`] is called, lookups find nothing, proofs are
/// empty and never verify, and the root hash stays at its pre-batch value.
///
/// # Example
/// ```
/// use cmtree::MerkleTree;
///
/// let tree = MerkleTree::new(&["A", "B", "C", "D", "E"]).unwrap();
/// let proof = tree.get_proof("C");
/// assert_eq!(3, proof.len());
/// assert!(tree.verify_proof("C", &proof));
///
/// let proof_d = tree.get_proof("D");
/// tree.update_single_leaf("C", "F").unwrap();
/// // C is D's sibling, so D's old proof no longer matches the root
/// assert!(!tree.verify_proof("D", &proof_d));
/// assert!(tree.verify_proof("D", &tree.get_proof("D")));
/// assert!(tree.verify_proof("F", &tree.get_proof("F")));
/// ```
pub struct MerkleTree<D = Sha256Ops> {
    pub(crate) core: Arc<TreeCore<D>>,
}

impl<D> Clone for MerkleTree<D> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl MerkleTree<Sha256Ops> {
    /// Builds a SHA-256 tree over `data` with the default configuration.
    pub fn new<S: AsRef<str>>(data: &[S]) -> Result<Self, TreeError> {
        Self::with_config(data, Config::default())
    }

    pub fn with_config<S: AsRef<str>>(data: &[S], config: Config) -> Result<Self, TreeError> {
        Self::with_ops(data, Sha256Ops, config)
    }
}

impl<D: DigestOps + 'static> MerkleTree<D> {
    /// Builds a tree over `data` using `ops` as its digest function.
    ///
    /// Fails with [`TreeError::InvalidInput`] when `data` is empty.
    pub fn with_ops<S: AsRef<str>>(data: &[S], ops: D, config: Config) -> Result<Self, TreeError> {
        if data.is_empty() {
            return Err(TreeError::InvalidInput(
                "data list not expected to be empty".to_string(),
            ));
        }
        debug!("build merkle tree over {} leaves", data.len());
        let (nodes, root) = build_nodes(&ops, data);
        let core = TreeCore {
            id: next_tree_id(),
            ops,
            config,
            nodes,
            root,
            leaf_count: data.len(),
            lock: RwLock::new(()),
            conflict_nodes: DashMap::new(),
            stalled: Mutex::new(None),
        };
        info!(
            "new merkle tree root hash is {}",
            hasher::to_hex(&core.nodes[root].digest())
        );
        Ok(Self {
            core: Arc::new(core),
        })
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.core.leaf_count
    }

    pub fn is_empty(&self) -> bool {
        self.core.leaf_count == 0
    }

    pub fn config(&self) -> &Config {
        &self.core.config
    }

    /// Whether `leaf` was handed out by this tree.
    pub fn owns(&self, leaf: &Leaf) -> bool {
        leaf.tree_id == self.core.id && leaf.index < self.core.leaf_count
    }

    /// Handles for every leaf, in input order.
    pub fn leaves(&self) -> Vec<Leaf> {
        (0..self.core.leaf_count).map(|i| self.leaf_at(i)).collect()
    }

    fn leaf_at(&self, index: usize) -> Leaf {
        Leaf {
            tree_id: self.core.id,
            index,
        }
    }

    /// The leaf currently holding `value`.
    ///
    /// When several leaves hold the same value, the one with the lowest
    /// index is returned.
    pub fn find_leaf(&self, value: &str) -> Option<Leaf> {
        let _guard = self.core.lock.read();
        if self.core.is_stalled() {
            return None;
        }
        self.core.find_leaf_id(value).map(|i| self.leaf_at(i))
    }

    pub fn leaf_value(&self, leaf: &Leaf) -> Option<String> {
        if !self.owns(leaf) {
            return None;
        }
        let _guard = self.core.lock.read();
        if self.core.is_stalled() {
            return None;
        }
        self.core.nodes[leaf.index].value()
    }

    pub fn leaf_digest(&self, leaf: &Leaf) -> Option<Hash32> {
        if !self.owns(leaf) {
            return None;
        }
        let _guard = self.core.lock.read();
        if self.core.is_stalled() {
            return None;
        }
        Some(self.core.nodes[leaf.index].digest())
    }

    pub fn root_hash(&self) -> Hash32 {
        let _guard = self.core.lock.read();
        self.core.committed_root()
    }

    /// A snapshot of the root node. The root is a leaf when the tree was
    /// built from a single value.
    pub fn root(&self) -> NodeSnapshot {
        let _guard = self.core.lock.read();
        if let Some(batch) = self.core.stalled.lock().as_ref() {
            return NodeSnapshot {
                digest: batch.committed_root,
                value: None,
                children: None,
            };
        }
        let nodes = &self.core.nodes;
        let root = &nodes[self.core.root];
        NodeSnapshot {
            digest: root.digest(),
            value: root.value(),
            children: root
                .children()
                .map(|(l, r)| (nodes[l].digest(), nodes[r].digest())),
        }
    }

    /// Inclusion proof for the leaf holding `value`, ordered leaf to root.
    ///
    /// Returns an empty proof when no leaf holds `value`, and also when the
    /// tree has a single leaf (the root needs no proof).
    pub fn get_proof(&self, value: &str) -> Vec<ProofEntry> {
        let _guard = self.core.lock.read();
        if self.core.is_stalled() {
            warn!("get proof of {} refused, the merkle tree needs a reset", value);
            return vec![];
        }
        let nodes = &self.core.nodes;
        let Some(leaf) = self.core.find_leaf_id(value) else {
            debug!("get proof failed, {} not found in the merkle tree", value);
            return vec![];
        };

        let mut proof = Vec::with_capacity(nodes[leaf].depth as usize);
        let mut cur = leaf;
        while let Some(parent) = nodes[cur].parent {
            let Some((left, right)) = nodes[parent].children() else {
                unreachable!("parent {} is a leaf", parent);
            };
            let entry = if cur == left {
                ProofEntry::new(nodes[right].digest(), Direction::Right)
            } else {
                ProofEntry::new(nodes[left].digest(), Direction::Left)
            };
            proof.push(entry);
            cur = parent;
        }
        debug!(
            "merkle proof of {} is {}",
            value,
            proof::format_proof(&proof)
        );
        proof
    }

    /// Checks `proof` for the leaf holding `value` against the current root.
    ///
    /// Returns `false` when no leaf holds `value` or when that leaf is the
    /// root itself. Only the leaf's digest and the root digest are read; the
    /// path is replayed from `proof` alone.
    pub fn verify_proof(&self, value: &str, proof: &[ProofEntry]) -> bool {
        let _guard = self.core.lock.read();
        if self.core.is_stalled() {
            warn!("verify proof of {} refused, the merkle tree needs a reset", value);
            return false;
        }
        let nodes = &self.core.nodes;
        let Some(leaf) = self.core.find_leaf_id(value) else {
            warn!("data {} does not exist in the merkle tree", value);
            return false;
        };
        if nodes[leaf].parent.is_none() {
            return false;
        }
        let root = nodes[self.core.root].digest();
        proof::check_proof(&self.core.ops, &nodes[leaf].digest(), proof, &root)
    }

    /// Number of conflict nodes registered for a batch in progress.
    /// Zero whenever no update is running.
    pub fn pending_conflicts(&self) -> usize {
        let _guard = self.core.lock.read();
        self.core.conflict_nodes.len()
    }

    /// Whether every node's visited flag is clear.
    pub fn all_unvisited(&self) -> bool {
        let _guard = self.core.lock.read();
        self.core.nodes.iter().all(|n| !n.is_visited())
    }

    /// Whether a timed-out batch is waiting for [`MerkleTree::reset`].
    pub fn needs_reset(&self) -> bool {
        self.core.is_stalled()
    }

    /// Verifies every digest and structural invariant of the tree.
    ///
    /// # Panics
    /// Panics on the first violation found.
    pub fn check_consistency(&self) {
        let _guard = self.core.lock.read();
        self.core.check_all();
    }
}

impl<D> fmt::Debug for MerkleTree<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = &self.core;
        f.debug_struct("MerkleTree")
            .field("id", &core.id)
            .field("leaves", &core.leaf_count)
            .field("root", &hasher::to_hex(&core.committed_root()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helper::{FIXTURE_DATA, FIXTURE_ROOT};

    #[test]
    fn test_empty_input_is_rejected() {
        let data: Vec<String> = vec![];
        assert!(matches!(
            MerkleTree::new(&data),
            Err(TreeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_fixture_root() {
        let tree = MerkleTree::new(&FIXTURE_DATA).unwrap();
        assert_eq!(FIXTURE_ROOT, hasher::to_hex(&tree.root_hash()));
        let root = tree.root();
        assert_eq!(None, root.value);
        assert!(root.children.is_some());
        assert!(root.to_string().ends_with(&format!("hash = {}}}", FIXTURE_ROOT)));
    }

    #[test]
    fn test_single_leaf_tree() {
        let tree = MerkleTree::new(&["A"]).unwrap();
        assert_eq!(hasher::hash("A"), tree.root_hash());
        assert_eq!(Some("A".to_string()), tree.root().value);
        assert!(tree.get_proof("A").is_empty());
        assert!(!tree.verify_proof("A", &[]));
    }

    #[test]
    fn test_find_leaf_prefers_lowest_index() {
        let tree = MerkleTree::new(&["x", "y", "x", "y"]).unwrap();
        assert_eq!(0, tree.find_leaf("x").unwrap().index());
        assert_eq!(1, tree.find_leaf("y").unwrap().index());
        assert_eq!(None, tree.find_leaf("z"));
    }

    #[test]
    fn test_leaf_handles_are_tree_scoped() {
        let t1 = MerkleTree::new(&FIXTURE_DATA).unwrap();
        let t2 = MerkleTree::new(&FIXTURE_DATA).unwrap();
        let leaf = t1.find_leaf("B").unwrap();
        assert!(t1.owns(&leaf));
        assert!(!t2.owns(&leaf));
        assert_eq!(Some("B".to_string()), t1.leaf_value(&leaf));
        assert_eq!(None, t2.leaf_value(&leaf));
        assert_eq!(Some(hasher::hash("B")), t1.leaf_digest(&leaf));
        assert_eq!(5, t1.leaves().len());
        assert_eq!(t1.leaves(), t1.clone().leaves());
    }

    #[test]
    fn test_proof_for_fixture_leaf() {
        let tree = MerkleTree::new(&FIXTURE_DATA).unwrap();
        let proof = tree.get_proof("C");
        let dirs: Vec<Direction> = proof.iter().map(|e| e.direction).collect();
        assert_eq!(vec![Direction::Right, Direction::Left, Direction::Right], dirs);
        assert_eq!(
            "3f39d5c348e5b79d06e842c114e6cc571583bbf44e4b0ebfda1a01ec05745d43",
            hasher::to_hex(&proof[0].sibling)
        );
        assert_eq!(
            "63956f0ce48edc48a0d528cb0b5d58e4d625afb14d63ca1bb9950eb657d61f40",
            hasher::to_hex(&proof[1].sibling)
        );
        assert_eq!(
            "d48e3e0653332ff79423214119dfc2d81992f4b9778520be3a424b334b846c9d",
            hasher::to_hex(&proof[2].sibling)
        );
        assert!(tree.verify_proof("C", &proof));
    }

    #[test]
    fn test_old_proof_depends_on_changed_siblings() {
        let tree = MerkleTree::new(&FIXTURE_DATA).unwrap();
        let proof_c = tree.get_proof("C");
        let proof_d = tree.get_proof("D");
        tree.update_single_leaf("C", "F").unwrap();
        // D's path holds C's digest, C's own path does not
        assert!(!tree.verify_proof("D", &proof_d));
        assert!(tree.verify_proof("F", &proof_c));
        assert!(tree.verify_proof("D", &tree.get_proof("D")));
    }

    #[test]
    fn test_self_paired_leaf_proof() {
        let tree = MerkleTree::new(&FIXTURE_DATA).unwrap();
        let proof = tree.get_proof("E");
        // E is paired with itself on the first level
        assert_eq!(hasher::hash("E"), proof[0].sibling);
        assert_eq!(Direction::Right, proof[0].direction);
        assert!(tree.verify_proof("E", &proof));
    }
}
