//! Submission and confirmation tracking for deployment transactions.

use std::time::Duration;

use backon::{ConstantBuilder, Retryable};

use crate::{
    Cancellation, DeployError, NetworkError,
    network::{DeployPayload, NetworkClient, TxId, TxStatus},
};

/// Default interval between two status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A deployment that reached the requested confirmation depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmed {
    pub tx: TxId,
    pub address: String,
}

/// Waits for transactions to be buried under enough blocks.
///
/// Polls at a fixed interval. Transient RPC errors are retried with the same
/// interval, bounded by the number of polls that fit in the timeout, and never
/// fail the wait on their own.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationWaiter {
    poll_interval: Duration,
}

impl Default for ConfirmationWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl ConfirmationWaiter {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Submit `payload` and wait until it has `required` confirmations.
    ///
    /// The submission itself is never retried.
    pub async fn submit_and_wait<N: NetworkClient>(
        &self,
        network: &N,
        payload: &DeployPayload,
        required: u64,
        timeout: Duration,
        cancel: &Cancellation,
    ) -> Result<Confirmed, DeployError> {
        cancel.check()?;

        let tx = network
            .submit_transaction(payload)
            .await
            .map_err(|source| DeployError::Submission {
                unit: payload.unit.clone(),
                source,
            })?;

        tracing::info!(unit = %payload.unit, tx = %tx, required, "Deployment transaction submitted");

        let address = self
            .wait_for_confirmations(network, &payload.unit, &tx, required, timeout, cancel)
            .await?;

        Ok(Confirmed { tx, address })
    }

    /// Wait until `tx` has `required` confirmations and return the address of
    /// the contract it created.
    pub async fn wait_for_confirmations<N: NetworkClient>(
        &self,
        network: &N,
        unit: &str,
        tx: &TxId,
        required: u64,
        timeout: Duration,
        cancel: &Cancellation,
    ) -> Result<String, DeployError> {
        let required = required.max(1);
        let timed_out = || DeployError::ConfirmationTimeout {
            unit: unit.to_string(),
            tx: tx.to_string(),
            timeout,
        };

        let wait = async {
            loop {
                let status = (|| network.transaction_status(tx))
                    .retry(self.backoff(timeout))
                    .notify(|err: &NetworkError, delay: Duration| {
                        tracing::warn!(unit, tx = %tx, error = %err, ?delay, "Status check failed, retrying");
                    })
                    .await
                    .map_err(|_| timed_out())?;

                match status {
                    TxStatus::Reverted => {
                        return Err(DeployError::TransactionReverted {
                            unit: unit.to_string(),
                            tx: tx.to_string(),
                        });
                    }
                    TxStatus::Pending => {
                        tracing::debug!(unit, tx = %tx, "Transaction pending");
                    }
                    TxStatus::Success { contract_address } => {
                        let confirmations = self.confirmations(network, unit, tx, timeout).await?;
                        tracing::debug!(unit, tx = %tx, confirmations, required, "Transaction included");

                        if confirmations >= required {
                            return Ok(contract_address);
                        }
                    }
                }

                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(DeployError::Cancelled),
            result = tokio::time::timeout(timeout, wait) => result.unwrap_or_else(|_| Err(timed_out())),
        }
    }

    /// Confirmation depth of `tx`, counting an unknown transaction as zero.
    async fn confirmations<N: NetworkClient>(
        &self,
        network: &N,
        unit: &str,
        tx: &TxId,
        timeout: Duration,
    ) -> Result<u64, DeployError> {
        let result = (|| network.confirmation_count(tx))
            .retry(self.backoff(timeout))
            .when(|err: &NetworkError| !matches!(err, NetworkError::NotFound))
            .notify(|err: &NetworkError, delay: Duration| {
                tracing::warn!(unit, tx = %tx, error = %err, ?delay, "Confirmation check failed, retrying");
            })
            .await;

        match result {
            Ok(count) => Ok(count),
            Err(NetworkError::NotFound) => Ok(0),
            Err(_) => Err(DeployError::ConfirmationTimeout {
                unit: unit.to_string(),
                tx: tx.to_string(),
                timeout,
            }),
        }
    }

    /// Fixed-interval retry policy sized so that retries alone cannot outlast `timeout`.
    fn backoff(&self, timeout: Duration) -> ConstantBuilder {
        let interval = self.poll_interval.max(Duration::from_millis(1));
        let attempts = (timeout.as_millis() / interval.as_millis()).max(1);

        ConstantBuilder::default()
            .with_delay(interval)
            .with_max_times(usize::try_from(attempts).unwrap_or(usize::MAX))
    }
}
