//! Broadcast-based shutdown signaling for sync coordination.
//!
//! A single shutdown signal reaches every subscribed receiver simultaneously.
//! Receivers observe the signal at their next suspension point, which lets the
//! orchestrator stop at a consistent place instead of being torn down
//! mid-operation.

use tokio::sync::watch;

/// Transmitter side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Signals shutdown to every subscribed receiver.
    ///
    /// Fails only when no receiver is alive anymore, in which case there is
    /// nothing left to shut down.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<bool>> {
        self.0.send(true)
    }

    /// Creates a new receiver subscribed to this channel.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiver side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// True once shutdown has been signaled.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Completes once shutdown has been signaled.
    pub async fn wait_for_shutdown(&mut self) {
        if self.0.wait_for(|shutdown| *shutdown).await.is_err() {
            // The controlling handle is gone without signaling, so no shutdown
            // can ever arrive; park forever instead of spinning the caller.
            std::future::pending::<()>().await;
        }
    }
}

/// Creates the shutdown channel used to coordinate graceful termination.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn receivers_observe_the_shutdown_signal() {
        let (tx, mut rx) = create_shutdown_channel();
        assert!(!rx.is_shutdown());

        tx.shutdown().unwrap();

        timeout(Duration::from_secs(1), rx.wait_for_shutdown())
            .await
            .unwrap();
        assert!(rx.is_shutdown());
    }

    #[tokio::test]
    async fn late_subscribers_see_an_already_signaled_shutdown() {
        let (tx, _rx) = create_shutdown_channel();
        tx.shutdown().unwrap();

        let mut late = tx.subscribe();
        assert!(late.is_shutdown());

        timeout(Duration::from_secs(1), late.wait_for_shutdown())
            .await
            .unwrap();
    }
}
