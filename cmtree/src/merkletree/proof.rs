//! Inclusion proofs.
//!
//! A proof is the list of sibling digests met while climbing from a leaf to
//! the root, each tagged with the side the sibling sits on. Replaying it
//! from the leaf's digest must land on the root digest.

use std::fmt;

use crate::utils::hasher::{self, DigestOps, Hash32};

/// The side on which a proof entry's sibling sits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Direction {
    /// Sibling is the left child: `combine(sibling, current)`.
    Left,
    /// Sibling is the right child: `combine(current, sibling)`.
    Right,
}

/// One step of an inclusion proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProofEntry {
    pub sibling: Hash32,
    pub direction: Direction,
}

impl ProofEntry {
    pub fn new(sibling: Hash32, direction: Direction) -> Self {
        Self { sibling, direction }
    }

    /// Combines `current` with this entry's sibling on the recorded side.
    pub fn apply<D: DigestOps>(&self, ops: &D, current: &Hash32) -> Hash32 {
        match self.direction {
            Direction::Left => ops.combine(&self.sibling, current),
            Direction::Right => ops.combine(current, &self.sibling),
        }
    }
}

impl fmt::Display for ProofEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is {} child",
            hasher::to_hex(&self.sibling),
            self.direction
        )
    }
}

/// Folds `proof` over `leaf_digest`, returning the implied root digest.
pub fn fold_proof<D: DigestOps>(ops: &D, leaf_digest: &Hash32, proof: &[ProofEntry]) -> Hash32 {
    proof
        .iter()
        .fold(*leaf_digest, |acc, entry| entry.apply(ops, &acc))
}

/// Checks that `proof` leads from `leaf_digest` to `root`.
///
/// This needs nothing from the tree besides the two digests, so it works
/// for a verifier that only knows a root.
pub fn check_proof<D: DigestOps>(
    ops: &D,
    leaf_digest: &Hash32,
    proof: &[ProofEntry],
    root: &Hash32,
) -> bool {
    fold_proof(ops, leaf_digest, proof) == *root
}

/// Formats a proof as a bracketed list, one entry per item.
pub fn format_proof(proof: &[ProofEntry]) -> String {
    let items: Vec<String> = proof.iter().map(|e| e.to_string()).collect();
    format!("[{}]", items.join(", "))
}
