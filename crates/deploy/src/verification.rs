//! Best-effort explorer verification of deployed contracts.
//!
//! Every failure is classified into a [`VerificationResult`]; the only error
//! that crosses this boundary is [`DeployError::Cancelled`].

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::{
    Cancellation, ConfirmationWaiter, DeployConfig, DeployError, DeploymentRecord,
    DeploymentUnit, ExplorerError, VerificationResult,
    explorer::{ExplorerClient, VerificationRequest},
    network::NetworkClient,
};

/// How many times a rate-limited verification is retried.
const RATE_LIMIT_RETRIES: usize = 3;

/// Attempts explorer verification for deployed units.
#[derive(Debug, Clone)]
pub struct VerificationAgent {
    waiter: ConfirmationWaiter,
    enabled: bool,
    local_network: bool,
    required_confirmations: u64,
    timeout: Duration,
}

impl VerificationAgent {
    pub fn new(config: &DeployConfig) -> Self {
        Self {
            waiter: ConfirmationWaiter::new(config.poll_interval()),
            enabled: config.verify,
            local_network: config.is_local(),
            required_confirmations: config.verification_confirmations(),
            timeout: config.verification_timeout(),
        }
    }

    /// Try to verify the deployment described by `record`.
    pub async fn attempt<N, X>(
        &self,
        network: &N,
        explorer: &X,
        record: &DeploymentRecord,
        unit: &DeploymentUnit,
        cancel: &Cancellation,
    ) -> Result<VerificationResult, DeployError>
    where
        N: NetworkClient,
        X: ExplorerClient,
    {
        if !unit.verify {
            return Ok(VerificationResult::skipped("verification disabled for unit"));
        }
        if self.local_network {
            return Ok(VerificationResult::skipped("local network"));
        }
        if !self.enabled {
            return Ok(VerificationResult::skipped("verification disabled"));
        }

        let constructor_args = match unit.encode_args(&record.constructor_args_resolved) {
            Ok(encoded) => hex::encode(encoded),
            Err(err) => return Ok(VerificationResult::failed(err.to_string())),
        };

        tracing::info!(
            unit = %unit.name,
            confirmations = self.required_confirmations,
            "Waiting for block confirmations before verification..."
        );

        match self
            .waiter
            .wait_for_confirmations(
                network,
                &unit.name,
                &record.transaction_id,
                self.required_confirmations,
                self.timeout,
                cancel,
            )
            .await
        {
            Ok(_) => {}
            Err(DeployError::Cancelled) => return Err(DeployError::Cancelled),
            Err(err) => {
                tracing::warn!(unit = %unit.name, error = %err, "Verification margin not reached");
                return Ok(VerificationResult::failed(err.to_string()));
            }
        }

        let request = VerificationRequest {
            unit: unit.name.clone(),
            address: record.address.clone(),
            source_ref: unit.source_ref().to_string(),
            constructor_args,
        };

        tracing::info!(unit = %unit.name, address = %record.address, "Verifying contract...");

        let verify = (|| explorer.verify(&request))
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(self.waiter.poll_interval())
                    .with_max_times(RATE_LIMIT_RETRIES),
            )
            .when(|err: &ExplorerError| matches!(err, ExplorerError::RateLimited(_)))
            .notify(|err: &ExplorerError, delay: Duration| {
                tracing::debug!(unit = %unit.name, error = %err, ?delay, "Explorer rate limited, retrying");
            });

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(DeployError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, verify) => outcome,
        };

        let result = match outcome {
            Ok(Ok(())) => VerificationResult::verified(),
            Ok(Err(ExplorerError::AlreadyVerified)) => VerificationResult {
                reason: Some("already verified".to_string()),
                ..VerificationResult::verified()
            },
            Ok(Err(err)) => VerificationResult::failed(err.to_string()),
            Err(_) => VerificationResult::failed(format!(
                "explorer did not answer within {:?}",
                self.timeout
            )),
        };

        match &result.reason {
            Some(reason) if result.status == crate::VerificationStatus::Failed => {
                tracing::warn!(unit = %unit.name, reason = %reason, "Verification failed");
            }
            _ => tracing::info!(unit = %unit.name, "Contract verified"),
        }

        Ok(result)
    }
}
