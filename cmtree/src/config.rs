//! Configuration for a Merkle tree.
//!
//! The tree itself never spawns threads. The settings here control how a
//! batch update waits on the caller's scheduler and whether the tree checks
//! its own invariants after each write:
//! - `await_timeout`: deadline for a concurrent batch (default: none)
//! - `check_consistency`: verify every digest after each update
//!   (default: on in debug builds)
//! - `worker_count`: size of a pool built with [`Config::build_thread_pool`]
//!
//! # Usage Examples
//! ```
//! use std::time::Duration;
//! use cmtree::config::Config;
//!
//! let config = Config::default()
//!     .with_await_timeout(Duration::from_secs(5))
//!     .with_worker_count(3);
//! let pool = config.build_thread_pool();
//! assert_eq!(pool.max_count(), 3);
//! ```

use std::time::Duration;

use threadpool::{Builder, ThreadPool};

use crate::def::{DEFAULT_WORKER_COUNT, WORKER_THREAD_NAME};

/// Settings of a [`crate::MerkleTree`].
#[derive(Debug, Clone)]
pub struct Config {
    /// How long a concurrent batch waits for its work units. `None` waits forever.
    pub await_timeout: Option<Duration>,
    /// Run the full consistency check before releasing the write lock.
    pub check_consistency: bool,
    /// Number of threads used by [`Config::build_thread_pool`].
    pub worker_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            await_timeout: None,
            check_consistency: cfg!(debug_assertions),
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }
}

impl Config {
    pub fn with_await_timeout(mut self, timeout: Duration) -> Self {
        self.await_timeout = Some(timeout);
        self
    }

    pub fn with_check_consistency(mut self, check: bool) -> Self {
        self.check_consistency = check;
        self
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Builds a thread pool with `worker_count` threads (at least one).
    pub fn build_thread_pool(&self) -> ThreadPool {
        Builder::new()
            .num_threads(self.worker_count.max(1))
            .thread_name(WORKER_THREAD_NAME.to_string())
            .build()
    }
}
