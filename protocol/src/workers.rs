//! # Worker Pool
//!
//! Bounded fan-out for issuance workflows. One task per course, per
//! student, per faculty; at most `limit` of them in flight; all results
//! collected in submission order; the first failure aborts everything
//! still running.
//!
//! Aborting a task mid-flight is safe for the workflows we run here: an
//! aborted wait never undoes a nonce reservation, and a submitted call stays
//! submitted. Dropping the `run` future aborts the whole group as well.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::DEFAULT_WORKER_LIMIT;

/// Why a pool run stopped early.
#[derive(Debug, thiserror::Error)]
pub enum PoolError<E> {
    #[error("task {index} failed: {source}")]
    Task {
        index: usize,
        #[source]
        source: E,
    },

    #[error("task panicked or was cancelled: {0}")]
    Join(String),
}

impl<E> PoolError<E> {
    /// The failing task's own error, if it returned one.
    pub fn into_task_error(self) -> Option<E> {
        match self {
            PoolError::Task { source, .. } => Some(source),
            PoolError::Join(_) => None,
        }
    }
}

/// Runs futures with bounded concurrency.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    limit: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKER_LIMIT)
    }
}

impl WorkerPool {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Spawns every task, lets at most `limit` run at once, and returns the
    /// results in the order the tasks were given.
    pub async fn run<I, Fut, T, E>(&self, tasks: I) -> Result<Vec<T>, PoolError<E>>
    where
        I: IntoIterator<Item = Fut>,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let mut set = JoinSet::new();
        let mut count = 0usize;

        for (index, task) in tasks.into_iter().enumerate() {
            let permits = Arc::clone(&semaphore);
            set.spawn(async move {
                // The semaphore is never closed, so acquisition only waits.
                let _permit = permits.acquire_owned().await.ok();
                (index, task.await)
            });
            count += 1;
        }

        let mut results: Vec<Option<T>> = (0..count).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, Ok(value))) => results[index] = Some(value),
                Ok((index, Err(source))) => {
                    set.abort_all();
                    tracing::warn!(index, remaining = set.len(), "worker failed, aborting group");
                    return Err(PoolError::Task { index, source });
                }
                Err(e) => {
                    set.abort_all();
                    return Err(PoolError::Join(e.to_string()));
                }
            }
        }

        Ok(results.into_iter().flatten().collect())
    }
}
