//! Execution seam for per-leaf update work.
//!
//! A batch update hands one job per modified leaf to a [`Scheduler`] and
//! then waits for every job to report back. The tree does not depend on
//! how the jobs are run; thread pools from `threadpool` and `rayon` both
//! work, as does [`Inline`], which runs each job on the calling thread.

use auto_impl::auto_impl;

/// A unit of work submitted by a batch update.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs submitted jobs, possibly in parallel.
///
/// Jobs must eventually run; a batch waits until every submitted job
/// has finished (or until the tree's configured timeout expires).
#[auto_impl(&, Arc)]
pub trait Scheduler: Send + Sync {
    /// Submits a job for execution.
    fn execute(&self, job: Job);
}

impl Scheduler for threadpool::ThreadPool {
    fn execute(&self, job: Job) {
        threadpool::ThreadPool::execute(self, job);
    }
}

impl Scheduler for rayon::ThreadPool {
    fn execute(&self, job: Job) {
        self.spawn(job);
    }
}

/// Runs every job immediately on the submitting thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct Inline;

impl Scheduler for Inline {
    fn execute(&self, job: Job) {
        job();
    }
}
