//! Batch leaf updates.
//!
//! Without a scheduler every modified leaf climbs to the root on the calling
//! thread. With a scheduler each modified leaf becomes one work unit, and
//! the units coordinate only at conflict nodes: the lowest common ancestors
//! of index-adjacent modified leaves. Exactly two climbs reach each conflict
//! node. The first to arrive flips the node's visited bit and stops; the
//! second finds the bit set, knows both subtrees are fresh, and carries on
//! recomputing towards the root. Every other ancestor lies on a single climb
//! and is recomputed without any locking.
//!
//! All of this runs while the caller holds the tree-wide write lock, so no
//! reader sees a half-updated tree.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use itertools::Itertools;
use log::{debug, info, warn};
use parking_lot::Mutex;

use super::node::{rehash, NodeId, TreeNode};
use super::tree::{LeafUpdate, MerkleTree, StalledBatch, TreeCore};
use crate::error::TreeError;
use crate::scheduler::Scheduler;
use crate::utils::hasher::{self, DigestOps, Hash32};

impl<D: DigestOps + 'static> MerkleTree<D> {
    /// Replaces the values of a batch of leaves and repairs every digest
    /// above them.
    ///
    /// Handles that do not belong to this tree are ignored. If the same leaf
    /// appears more than once, its last value wins. An empty batch is a
    /// no-op, unless the tree needs a reset.
    ///
    /// With `scheduler` set, one job per leaf is submitted to it and the call
    /// blocks until all of them have finished. If the tree's
    /// `await_timeout` passes first, the call returns
    /// [`TreeError::UpdateTimedOut`] and every later update fails with
    /// [`TreeError::NeedsReset`] until [`MerkleTree::reset`] is called.
    pub fn update_leaves(
        &self,
        updates: Vec<LeafUpdate>,
        scheduler: Option<&dyn Scheduler>,
    ) -> Result<(), TreeError> {
        let core = &self.core;
        let _guard = core.lock.write();
        if core.is_stalled() {
            return Err(TreeError::NeedsReset);
        }

        let mut batch: BTreeMap<NodeId, String> = BTreeMap::new();
        for update in updates {
            if !self.owns(&update.leaf) {
                debug!("drop leaf {} not in this tree", update.leaf.index());
                continue;
            }
            batch.insert(update.leaf.index(), update.value);
        }
        if batch.is_empty() {
            info!("no leaves to update exist in current merkle tree");
            return Ok(());
        }

        let committed_root = core.nodes[core.root].digest();
        // BTreeMap keeps the batch sorted by index
        let mut sorted = Vec::with_capacity(batch.len());
        for (idx, value) in batch {
            core.nodes[idx].replace_value(value);
            sorted.push(idx);
        }
        debug!("start to update leaves {:?}", sorted);

        match scheduler {
            None => {
                for &idx in &sorted {
                    climb(&core.ops, &core.nodes, idx);
                }
            }
            Some(scheduler) => self.update_concurrent(&sorted, committed_root, scheduler)?,
        }

        if core.config.check_consistency {
            core.check_all();
        }
        info!(
            "updated {} leaves, root hash is {}",
            sorted.len(),
            hasher::to_hex(&core.nodes[core.root].digest())
        );
        Ok(())
    }

    /// Replaces the value of the first leaf holding `old_value`.
    ///
    /// Returns `Ok(false)`, after logging a warning, when no leaf holds
    /// `old_value`.
    pub fn update_single_leaf(&self, old_value: &str, new_value: &str) -> Result<bool, TreeError> {
        let core = &self.core;
        let _guard = core.lock.write();
        if core.is_stalled() {
            return Err(TreeError::NeedsReset);
        }
        let Some(leaf) = core.find_leaf_id(old_value) else {
            warn!(
                "update leaf failed, {} not found in the merkle tree",
                old_value
            );
            return Ok(false);
        };
        core.nodes[leaf].replace_value(new_value.to_string());
        climb(&core.ops, &core.nodes, leaf);
        if core.config.check_consistency {
            core.check_all();
        }
        Ok(true)
    }

    /// Brings the tree back to a consistent state after a timed-out batch.
    ///
    /// Waits until every job of that batch has finished or been dropped,
    /// then clears the batch state and recomputes every digest from the leaf
    /// values. Calling it on a healthy tree just recomputes the digests.
    ///
    /// The wait is bounded by the tree's `await_timeout`. If it expires, the
    /// tree still needs a reset and [`TreeError::UpdateTimedOut`] is returned.
    pub fn reset(&self) -> Result<(), TreeError> {
        let core = &self.core;
        let _guard = core.lock.write();
        let mut stalled = core.stalled.lock();
        if let Some(batch) = stalled.as_mut() {
            if let Err(e) = drain(batch, core.config.await_timeout) {
                warn!("{}; reset abandoned", e);
                return Err(e);
            }
        }
        *stalled = None;
        drop(stalled);
        clear_batch_state(core);
        // children always precede their parent in the arena
        for id in 0..core.nodes.len() {
            rehash(&core.ops, &core.nodes, id);
        }
        info!(
            "merkle tree reset, root hash is {}",
            hasher::to_hex(&core.nodes[core.root].digest())
        );
        Ok(())
    }

    fn update_concurrent(
        &self,
        sorted: &[NodeId],
        committed_root: Hash32,
        scheduler: &dyn Scheduler,
    ) -> Result<(), TreeError> {
        let core = &self.core;
        for id in find_conflict_nodes(&core.nodes, sorted) {
            core.conflict_nodes.insert(id, Mutex::new(()));
        }
        debug!("{} conflict nodes", core.conflict_nodes.len());

        let (done_tx, done_rx) = channel::unbounded();
        for &idx in sorted {
            let core = self.core.clone();
            let done_tx = done_tx.clone();
            scheduler.execute(Box::new(move || {
                update_walk(&core, idx);
                // the receiver is gone only if the batch was abandoned
                let _ = done_tx.send(idx);
            }));
        }
        drop(done_tx);

        let submitted = sorted.len();
        if let Err(e) = wait_all(&done_rx, submitted, core.config.await_timeout) {
            warn!("{}; the tree needs a reset", e);
            if let TreeError::UpdateTimedOut { completed, .. } = e {
                *core.stalled.lock() = Some(StalledBatch {
                    done: done_rx,
                    completed,
                    submitted,
                    committed_root,
                });
            }
            return Err(e);
        }
        clear_batch_state(core);
        Ok(())
    }
}

/// Blocks until `submitted` jobs have reported on `done`.
///
/// Fails when the deadline passes, or when every job is gone before all of
/// them reported.
fn wait_all(
    done: &Receiver<NodeId>,
    submitted: usize,
    timeout: Option<Duration>,
) -> Result<(), TreeError> {
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut completed = 0;
    while completed < submitted {
        let received = match deadline {
            Some(deadline) => done.recv_deadline(deadline),
            None => done.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(_) => completed += 1,
            Err(_) => {
                return Err(TreeError::UpdateTimedOut {
                    completed,
                    submitted,
                })
            }
        }
    }
    Ok(())
}

/// Waits for the outstanding jobs of a timed-out batch.
///
/// Done once every job has reported or dropped its sender. A job that never
/// runs and is never dropped keeps this waiting until `timeout`.
fn drain(batch: &mut StalledBatch, timeout: Option<Duration>) -> Result<(), TreeError> {
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        let received = match deadline {
            Some(deadline) => batch.done.recv_deadline(deadline),
            None => batch.done.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(_) => batch.completed += 1,
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
            Err(RecvTimeoutError::Timeout) => {
                return Err(TreeError::UpdateTimedOut {
                    completed: batch.completed,
                    submitted: batch.submitted,
                })
            }
        }
    }
}

/// Recomputes the digest of `leaf` and of every ancestor up to the root.
fn climb<D: DigestOps>(ops: &D, nodes: &[TreeNode], leaf: NodeId) {
    rehash(ops, nodes, leaf);
    let mut cur = leaf;
    while let Some(parent) = nodes[cur].parent {
        rehash(ops, nodes, parent);
        cur = parent;
    }
}

/// The per-leaf work unit of a concurrent batch.
///
/// Climbs like [`climb`], except at a conflict node: the first climb to get
/// there marks it and stops, the second recomputes it and goes on.
fn update_walk<D: DigestOps>(core: &TreeCore<D>, leaf: NodeId) {
    let nodes = &core.nodes;
    rehash(&core.ops, nodes, leaf);
    let mut cur = leaf;
    while let Some(parent) = nodes[cur].parent {
        if let Some(rendezvous) = core.conflict_nodes.get(&parent) {
            let _lock = rendezvous.lock();
            if !nodes[parent].mark_visited() {
                // the sibling climb finishes this node
                return;
            }
        }
        rehash(&core.ops, nodes, parent);
        cur = parent;
    }
}

/// Lowest common ancestors of each pair of index-adjacent leaves.
///
/// `sorted` must be sorted by index and free of duplicates. Every point
/// where two climbs of the batch meet is in the result, exactly once.
pub fn find_conflict_nodes(nodes: &[TreeNode], sorted: &[NodeId]) -> Vec<NodeId> {
    sorted
        .iter()
        .tuple_windows()
        .map(|(&a, &b)| lowest_common_ancestor(nodes, a, b))
        .collect()
}

fn parent_of(nodes: &[TreeNode], id: NodeId) -> NodeId {
    nodes[id].parent.expect("only the root lacks a parent")
}

pub fn lowest_common_ancestor(nodes: &[TreeNode], mut a: NodeId, mut b: NodeId) -> NodeId {
    while nodes[a].depth > nodes[b].depth {
        a = parent_of(nodes, a);
    }
    while nodes[b].depth > nodes[a].depth {
        b = parent_of(nodes, b);
    }
    while a != b {
        a = parent_of(nodes, a);
        b = parent_of(nodes, b);
    }
    a
}

fn clear_batch_state<D>(core: &TreeCore<D>) {
    core.conflict_nodes.clear();
    for node in &core.nodes {
        node.clear_visited();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkletree::node::build_nodes;
    use crate::scheduler::Inline;
    use crate::test_helper::{
        FIXTURE_DATA, FIXTURE_ROOT_AFTER_AD, FIXTURE_ROOT_AFTER_ADE, FIXTURE_ROOT_AFTER_C_TO_F,
    };
    use crate::utils::hasher::Sha256Ops;

    fn hex_root(tree: &MerkleTree) -> String {
        hasher::to_hex(&tree.root_hash())
    }

    #[test]
    fn test_lowest_common_ancestor() {
        let (nodes, root) = build_nodes(&Sha256Ops, &FIXTURE_DATA);
        // A and B share their parent
        assert_eq!(nodes[0].parent.unwrap(), lowest_common_ancestor(&nodes, 0, 1));
        // A and D meet one level higher
        let ab = nodes[0].parent.unwrap();
        assert_eq!(nodes[ab].parent.unwrap(), lowest_common_ancestor(&nodes, 0, 3));
        // D and E only meet at the root
        assert_eq!(root, lowest_common_ancestor(&nodes, 3, 4));
        assert_eq!(2, lowest_common_ancestor(&nodes, 2, 2));
    }

    #[test]
    fn test_conflict_nodes_of_adjacent_pairs() {
        let (nodes, root) = build_nodes(&Sha256Ops, &FIXTURE_DATA);
        assert!(find_conflict_nodes(&nodes, &[]).is_empty());
        assert!(find_conflict_nodes(&nodes, &[2]).is_empty());
        let conflicts = find_conflict_nodes(&nodes, &[0, 3, 4]);
        let ab = nodes[0].parent.unwrap();
        assert_eq!(vec![nodes[ab].parent.unwrap(), root], conflicts);
    }

    #[test]
    fn test_sequential_single_update() {
        let tree = MerkleTree::new(&FIXTURE_DATA).unwrap();
        assert!(tree.update_single_leaf("C", "F").unwrap());
        assert_eq!(FIXTURE_ROOT_AFTER_C_TO_F, hex_root(&tree));
        assert!(!tree.update_single_leaf("C", "G").unwrap());
        assert_eq!(FIXTURE_ROOT_AFTER_C_TO_F, hex_root(&tree));
    }

    #[test]
    fn test_update_leaves_inline() {
        let tree = MerkleTree::new(&FIXTURE_DATA).unwrap();
        let a = tree.find_leaf("A").unwrap();
        let d = tree.find_leaf("D").unwrap();
        tree.update_leaves(vec![a.with_value("a"), d.with_value("d")], Some(&Inline))
            .unwrap();
        assert_eq!(FIXTURE_ROOT_AFTER_AD, hex_root(&tree));
        assert_eq!(0, tree.pending_conflicts());
        assert!(tree.all_unvisited());

        let e = tree.find_leaf("E").unwrap();
        tree.update_leaves(vec![e.with_value("e")], Some(&Inline))
            .unwrap();
        assert_eq!(FIXTURE_ROOT_AFTER_ADE, hex_root(&tree));
    }

    #[test]
    fn test_duplicate_handles_last_value_wins() {
        let tree = MerkleTree::new(&FIXTURE_DATA).unwrap();
        let c = tree.find_leaf("C").unwrap();
        tree.update_leaves(vec![c.with_value("X"), c.with_value("F")], Some(&Inline))
            .unwrap();
        assert_eq!(FIXTURE_ROOT_AFTER_C_TO_F, hex_root(&tree));
    }

    #[test]
    fn test_wait_all_reports_missing_jobs() {
        let (tx, rx) = channel::unbounded();
        tx.send(0).unwrap();
        drop(tx);
        assert_eq!(
            Err(TreeError::UpdateTimedOut {
                completed: 1,
                submitted: 2
            }),
            wait_all(&rx, 2, None)
        );
    }
}
