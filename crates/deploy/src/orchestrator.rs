//! The deployment run state machine.
//!
//! A run walks `Idle → Resolving → Deploying(i) → Verifying(i) → … → Completed`,
//! or ends in `Failed`. Units are processed strictly one at a time in resolved
//! order; the only suspension points are the confirmation wait after a
//! submission and the confirmation margin and explorer calls of verification.

use chrono::Utc;

use crate::{
    Cancellation, ConfirmationWaiter, DeployConfig, DeployError, DeploymentConfigHash,
    DeploymentOutcome, DeploymentRecord, DeploymentRecorder, DeploymentReport, DeploymentUnit,
    RunFailure, RunReport, RunStatus, UnitOutcome, VerificationAgent, VerificationResult,
    explorer::ExplorerClient,
    network::{DeployPayload, NetworkClient},
    resolver,
    store::ReportStore,
    unit::ArgValue,
};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
enum RunState {
    Idle,
    Resolving,
    #[display("Deploying({_0})")]
    Deploying(usize),
    #[display("Verifying({_0})")]
    Verifying(usize),
    Completed,
    Failed,
}

/// Drives deployment runs against one network.
///
/// All collaborators and the configuration are fixed at construction.
pub struct Orchestrator<N, X, S> {
    network: N,
    explorer: X,
    store: S,
    config: DeployConfig,
    waiter: ConfirmationWaiter,
    verifier: VerificationAgent,
    redeploy: bool,
}

impl<N, X, S> Orchestrator<N, X, S>
where
    N: NetworkClient,
    X: ExplorerClient,
    S: ReportStore,
{
    pub fn new(network: N, explorer: X, store: S, config: DeployConfig) -> Self {
        Self {
            waiter: ConfirmationWaiter::new(config.poll_interval()),
            verifier: VerificationAgent::new(&config),
            network,
            explorer,
            store,
            config,
            redeploy: false,
        }
    }

    /// Ignore the persisted report and deploy every unit again.
    pub fn redeploy(mut self, redeploy: bool) -> Self {
        self.redeploy = redeploy;
        self
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn explorer(&self) -> &X {
        &self.explorer
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Deploy `units` to the configured network.
    ///
    /// Returns `Err` only when the run could not start: unresolvable units, a
    /// held lease or an unreadable prior report. Nothing is submitted or
    /// written in that case. Any failure after that point is reported through
    /// a [`RunReport`] with [`RunStatus::Failed`], so the records of the units
    /// deployed so far are never lost.
    pub async fn run(
        &self,
        units: &[DeploymentUnit],
        cancel: &Cancellation,
    ) -> Result<RunReport, DeployError> {
        let network = self.config.network.as_str();
        let mut state = RunState::Idle;

        advance(&mut state, RunState::Resolving);
        let order = match resolver::resolve(units) {
            Ok(order) => order,
            Err(err) => {
                advance(&mut state, RunState::Failed);
                tracing::error!(network, error = %err, "Unit set cannot be deployed");
                return Err(err);
            }
        };

        let _lease = self.store.acquire_lease(network)?;
        let prior = if self.redeploy {
            tracing::info!(network, "Redeploy requested, ignoring any persisted report");
            None
        } else {
            DeploymentRecorder::load(&self.store, network)?
        };

        let report = self.initial_report(&order, prior);
        let mut recorder = DeploymentRecorder::new(&self.store, report);
        let mut outcomes = Vec::with_capacity(order.len());
        let mut failure: Option<RunFailure> = None;

        tracing::info!(network, units = order.len(), deployer = self.network.deployer(), "Starting deployment run");

        for (index, unit) in order.iter().copied().enumerate() {
            if failure.is_some() {
                outcomes.push(UnitOutcome {
                    name: unit.name.clone(),
                    deployment: DeploymentOutcome::NotAttempted,
                    verification: None,
                });
                continue;
            }

            advance(&mut state, RunState::Deploying(index));

            if let Some(existing) = recorder.report().deployed(&unit.name).cloned() {
                tracing::info!(unit = %unit.name, address = %existing.address, "Already deployed, skipping");
                let mut outcome = UnitOutcome {
                    name: unit.name.clone(),
                    deployment: DeploymentOutcome::SkippedAlreadyDeployed,
                    verification: None,
                };

                let prior = recorder
                    .report()
                    .verification_results
                    .get(&unit.name)
                    .filter(|result| !result.is_cancelled())
                    .cloned();

                match prior {
                    Some(result) => outcome.verification = Some(result),
                    None => {
                        tracing::info!(unit = %unit.name, "No verification outcome recorded, verifying again");
                        advance(&mut state, RunState::Verifying(index));
                        let (result, err) = self
                            .verify_unit(unit, &existing, &mut recorder, cancel)
                            .await;
                        outcome.verification = Some(result);
                        if let Some(err) = err {
                            failure = Some(RunFailure {
                                unit: Some(unit.name.clone()),
                                error: err.to_string(),
                            });
                        }
                    }
                }

                outcomes.push(outcome);
                continue;
            }

            let record = match self.deploy_unit(unit, recorder.report(), cancel).await {
                Ok(record) => record,
                Err(err) => {
                    tracing::error!(unit = %unit.name, error = %err, "Deployment failed");
                    outcomes.push(UnitOutcome {
                        name: unit.name.clone(),
                        deployment: DeploymentOutcome::Failed(err.to_string()),
                        verification: None,
                    });
                    failure = Some(RunFailure {
                        unit: Some(unit.name.clone()),
                        error: err.to_string(),
                    });
                    continue;
                }
            };

            let mut outcome = UnitOutcome {
                name: unit.name.clone(),
                deployment: DeploymentOutcome::Deployed,
                verification: None,
            };

            // The contract exists on-chain from here on, even if it cannot be recorded.
            if let Err(err) = recorder.append(record.clone()) {
                tracing::error!(unit = %unit.name, address = %record.address, error = %err, "Failed to persist deployment record");
                outcomes.push(outcome);
                failure = Some(RunFailure {
                    unit: Some(unit.name.clone()),
                    error: err.to_string(),
                });
                continue;
            }

            advance(&mut state, RunState::Verifying(index));

            let (result, err) = self
                .verify_unit(unit, &record, &mut recorder, cancel)
                .await;
            outcome.verification = Some(result);
            if let Some(err) = err {
                failure = Some(RunFailure {
                    unit: Some(unit.name.clone()),
                    error: err.to_string(),
                });
            }

            outcomes.push(outcome);
        }

        if let Err(err) = recorder.flush() {
            tracing::error!(network, error = %err, "Failed to persist final deployment report");
            if failure.is_none() {
                failure = Some(RunFailure {
                    unit: None,
                    error: err.to_string(),
                });
            }
        }

        let status = match failure {
            Some(_) => {
                advance(&mut state, RunState::Failed);
                RunStatus::Failed
            }
            None => {
                advance(&mut state, RunState::Completed);
                RunStatus::Completed
            }
        };

        tracing::info!(network, %status, records = recorder.report().records.len(), "Deployment run finished");

        Ok(RunReport {
            status,
            report: recorder.into_report(),
            outcomes,
            failure,
        })
    }

    /// The report a run starts from: the prior deployments carried over
    /// unchanged, stamped with the current configuration.
    fn initial_report(
        &self,
        units: &[&DeploymentUnit],
        prior: Option<DeploymentReport>,
    ) -> DeploymentReport {
        let network = &self.config.network;
        let config_hash =
            DeploymentConfigHash::new(network.as_str(), self.network.deployer()).compute_hash();

        let mut report = DeploymentReport::new(network.as_str());
        report.config_hash = config_hash;
        report.config = self.config.as_flat();

        let Some(prior) = prior else {
            return report;
        };

        if !prior.config_hash.is_empty() && prior.config_hash != report.config_hash {
            tracing::warn!(
                network = %network,
                previous = %prior.config_hash,
                current = %report.config_hash,
                "Persisted deployments were produced with a different configuration, reusing them anyway"
            );
        }

        let mut verification_results = prior.verification_results;
        for record in prior.records {
            if record.address.is_empty() {
                tracing::warn!(unit = %record.name, "Dropping persisted record without an address");
                continue;
            }
            if !units.iter().any(|unit| unit.name == record.name) {
                tracing::warn!(unit = %record.name, address = %record.address, "Persisted deployment is not part of the unit set, keeping it");
            }
            if let Some(result) = verification_results.remove(&record.name) {
                report
                    .verification_results
                    .insert(record.name.clone(), result);
            }
            report.records.push(record);
        }

        report
    }

    /// Verify `record` and store the result, including the result of an
    /// interrupted attempt. Returns the error that ends the run, if any.
    async fn verify_unit(
        &self,
        unit: &DeploymentUnit,
        record: &DeploymentRecord,
        recorder: &mut DeploymentRecorder<'_, S>,
        cancel: &Cancellation,
    ) -> (VerificationResult, Option<DeployError>) {
        let (result, interrupted) = match self
            .verifier
            .attempt(&self.network, &self.explorer, record, unit, cancel)
            .await
        {
            Ok(result) => (result, None),
            Err(DeployError::Cancelled) => {
                tracing::warn!(unit = %unit.name, "Verification interrupted by cancellation");
                (VerificationResult::cancelled(), Some(DeployError::Cancelled))
            }
            Err(err) => {
                tracing::warn!(unit = %unit.name, error = %err, "Verification interrupted");
                (VerificationResult::failed(err.to_string()), Some(err))
            }
        };

        if let Err(err) = recorder.record_verification(&unit.name, result.clone()) {
            tracing::error!(unit = %unit.name, error = %err, "Failed to persist verification result");
            return (result, Some(interrupted.unwrap_or(err)));
        }

        (result, interrupted)
    }

    /// Build, submit and confirm the deployment of `unit`.
    async fn deploy_unit(
        &self,
        unit: &DeploymentUnit,
        report: &DeploymentReport,
        cancel: &Cancellation,
    ) -> Result<DeploymentRecord, DeployError> {
        let resolved = resolve_args(unit, report)?;
        let encoded = unit.encode_args(&resolved)?;
        let payload = DeployPayload {
            unit: unit.name.clone(),
            data: unit.creation_payload(&encoded),
        };

        tracing::info!(unit = %unit.name, args = ?resolved, "Deploying contract...");

        let confirmed = self
            .waiter
            .submit_and_wait(
                &self.network,
                &payload,
                self.config.confirmations,
                self.config.confirmation_timeout(),
                cancel,
            )
            .await?;

        tracing::info!(unit = %unit.name, address = %confirmed.address, tx = %confirmed.tx, "Contract deployed");

        Ok(DeploymentRecord {
            name: unit.name.clone(),
            address: confirmed.address,
            deployer: self.network.deployer().to_string(),
            transaction_id: confirmed.tx,
            timestamp: Utc::now(),
            constructor_args_resolved: resolved,
        })
    }
}

/// Substitute every reference in the constructor arguments of `unit` with the
/// address recorded in `report`.
fn resolve_args(unit: &DeploymentUnit, report: &DeploymentReport) -> Result<Vec<String>, DeployError> {
    unit.constructor_args
        .iter()
        .map(|arg| match &arg.value {
            ArgValue::Literal { value } => Ok(value.clone()),
            ArgValue::Reference { depends_on } => report
                .address_of(depends_on)
                .map(str::to_string)
                .ok_or_else(|| DeployError::UnknownReference {
                    unit: unit.name.clone(),
                    reference: depends_on.clone(),
                }),
        })
        .collect()
}

fn advance(state: &mut RunState, next: RunState) {
    tracing::debug!(from = %state, to = %next, "Run state transition");
    *state = next;
}
