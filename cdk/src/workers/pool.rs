use std::future::Future;

use tokio::task::JoinSet;
use tracing::debug;

use crate::cdk_error;
use crate::error::{CdkResult, ErrorKind};

/// Pool of spawned worker tasks.
///
/// Wraps a [`JoinSet`] so the orchestrator can observe task completion while it
/// multiplexes its queues, abort everything on fatal errors, and surface panics
/// as regular errors instead of losing them. Worker tasks route their own
/// failures through the output queue, so a task resolving to `Err` here always
/// means a panic.
#[derive(Debug)]
pub struct WorkerPool {
    join_set: JoinSet<()>,
    panic_kind: ErrorKind,
    panic_description: &'static str,
}

impl WorkerPool {
    /// Creates an empty pool whose panics are classified with `panic_kind`.
    pub fn new(panic_kind: ErrorKind, panic_description: &'static str) -> Self {
        Self {
            join_set: JoinSet::new(),
            panic_kind,
            panic_description,
        }
    }

    /// Spawns a worker task into the pool.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.join_set.spawn(future);
    }

    /// True when no worker tasks are tracked by the pool.
    pub fn is_empty(&self) -> bool {
        self.join_set.is_empty()
    }

    /// Number of worker tasks tracked by the pool.
    pub fn len(&self) -> usize {
        self.join_set.len()
    }

    /// Waits for the next worker task to finish.
    ///
    /// Returns `None` when the pool is empty. Cancelled tasks resolve to
    /// `Ok(())` since they are the result of a deliberate abort.
    pub async fn join_next(&mut self) -> Option<CdkResult<()>> {
        let result = self.join_set.join_next().await?;

        Some(match result {
            Ok(()) => Ok(()),
            Err(join_err) if join_err.is_cancelled() => {
                debug!("worker task was cancelled");
                Ok(())
            }
            Err(join_err) => Err(cdk_error!(
                self.panic_kind,
                self.panic_description,
                source: join_err
            )),
        })
    }

    /// Aborts every worker task still running.
    pub fn abort_all(&mut self) {
        self.join_set.abort_all();
    }

    /// Drains the pool, collecting panics from every remaining task.
    pub async fn wait_all(&mut self) -> CdkResult<()> {
        let mut errors = Vec::new();

        while let Some(result) = self.join_next().await {
            if let Err(err) = result {
                errors.push(err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> WorkerPool {
        WorkerPool::new(ErrorKind::PartitionReaderPanic, "Partition reader panicked")
    }

    #[tokio::test]
    async fn completed_tasks_join_without_error() {
        let mut pool = pool();
        pool.spawn(async {});
        pool.spawn(async {});

        assert!(pool.wait_all().await.is_ok());
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn panics_surface_as_errors() {
        let mut pool = pool();
        pool.spawn(async { panic!("boom") });

        let err = pool.wait_all().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartitionReaderPanic);
    }

    #[tokio::test]
    async fn aborted_tasks_do_not_count_as_panics() {
        let mut pool = pool();
        pool.spawn(async {
            std::future::pending::<()>().await;
        });

        pool.abort_all();
        assert!(pool.wait_all().await.is_ok());
    }
}
