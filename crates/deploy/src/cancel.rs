//! Cooperative cancellation of a deployment run.

use tokio::sync::watch;

use crate::DeployError;

/// Cancellation signal shared between a run and its caller.
///
/// Cloning yields another handle to the same signal. A run observes it at its
/// suspension points only; a transaction already broadcast stays broadcast.
#[derive(Debug, Clone)]
pub struct Cancellation {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Fail fast with [`DeployError::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> Result<(), DeployError> {
        if self.is_cancelled() {
            return Err(DeployError::Cancelled);
        }
        Ok(())
    }

    /// Resolve once cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let cancel = Cancellation::new();
        let waiter = cancel.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        assert!(!cancel.is_cancelled());
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake up")
            .unwrap();
        assert!(matches!(cancel.check(), Err(DeployError::Cancelled)));
    }
}
