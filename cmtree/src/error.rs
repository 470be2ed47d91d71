use thiserror::Error;

/// Errors from Merkle tree operations.
///
/// A value that is not present in the tree is not an error: lookups
/// return `None`, proofs come back empty and verification returns `false`.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TreeError {
    /// Construction was given no data.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The scheduler did not finish a batch before the configured deadline.
    #[error("batch update timed out after {completed} of {submitted} leaves")]
    UpdateTimedOut { completed: usize, submitted: usize },

    /// A previous batch timed out and `reset` has not been called since.
    #[error("tree must be reset after a timed-out batch")]
    NeedsReset,
}
