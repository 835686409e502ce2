//! Backpressure on reader task submission.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::cdk_error;
use crate::error::{CdkResult, ErrorKind};

/// Bounds the number of in-flight partition reader tasks.
///
/// A slot is taken before a reader task is submitted and held by that task
/// until it completes, so the number of outstanding tasks can never exceed the
/// configured ceiling.
#[derive(Debug, Clone)]
pub struct Throttler {
    permits: Arc<Semaphore>,
}

impl Throttler {
    /// Creates a throttler allowing at most `max_concurrent_tasks` slots.
    pub fn new(max_concurrent_tasks: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent_tasks)),
        }
    }

    /// Waits until an execution slot is free and takes it.
    ///
    /// The returned permit must be moved into the submitted task so the slot
    /// is released exactly when the task finishes.
    pub async fn wait_and_acquire(&self) -> CdkResult<OwnedSemaphorePermit> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| cdk_error!(ErrorKind::InvalidState, "Throttler semaphore was closed"))
    }

    /// Number of currently free execution slots.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn slots_are_bounded_by_the_ceiling() {
        let throttler = Throttler::new(2);

        let first = throttler.wait_and_acquire().await.unwrap();
        let _second = throttler.wait_and_acquire().await.unwrap();
        assert_eq!(throttler.available_slots(), 0);

        // The third acquisition must block until a slot frees up.
        let blocked = timeout(Duration::from_millis(50), throttler.wait_and_acquire()).await;
        assert!(blocked.is_err());

        drop(first);
        let third = timeout(Duration::from_secs(1), throttler.wait_and_acquire())
            .await
            .unwrap();
        assert!(third.is_ok());
    }
}
