//! Core definitions and constants for the Merkle tree.
//!
//! This module contains the constants shared by the tree, its
//! configuration and the batch updater.

/// Length in bytes of every digest stored in the tree.
pub const HASH_LEN: usize = 32;

/// Default number of worker threads in a pool built from [`crate::config::Config`].
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Name prefix given to threads of a pool built from [`crate::config::Config`].
pub const WORKER_THREAD_NAME: &str = "cmtree-worker";
