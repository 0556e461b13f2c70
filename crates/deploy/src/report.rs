//! Deployment records and reports.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use serde::{Deserialize, Serialize};

use crate::{DeployError, network::TxId};

/// Outcome of one confirmed deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub name: String,
    pub address: String,
    pub deployer: String,
    pub transaction_id: TxId,
    pub timestamp: DateTime<Utc>,
    /// Constructor arguments with references replaced by addresses.
    pub constructor_args_resolved: Vec<String>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VerificationStatus {
    Verified,
    Failed,
    Skipped,
}

/// Result of a verification attempt, recorded per unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VerificationResult {
    pub fn verified() -> Self {
        Self {
            status: VerificationStatus::Verified,
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: VerificationStatus::Failed,
            reason: Some(reason.into()),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: VerificationStatus::Skipped,
            reason: Some(reason.into()),
        }
    }

    /// Verification interrupted by a cancelled run.
    pub fn cancelled() -> Self {
        Self::failed(DeployError::Cancelled.to_string())
    }

    /// Whether the attempt was interrupted before the explorer answered.
    pub fn is_cancelled(&self) -> bool {
        self.status == VerificationStatus::Failed
            && self.reason.as_deref() == Some(DeployError::Cancelled.to_string().as_str())
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{}: {}", self.status, reason),
            None => write!(f, "{}", self.status),
        }
    }
}

/// Persisted deployment state of one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReport {
    pub network: String,
    /// Hash of the deployment-relevant configuration the records were produced with.
    #[serde(default)]
    pub config_hash: String,
    /// Configuration used for the run, credentials excluded.
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    /// Records in deployment order.
    pub records: Vec<DeploymentRecord>,
    #[serde(default)]
    pub verification_results: BTreeMap<String, VerificationResult>,
}

impl DeploymentReport {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            config_hash: String::new(),
            config: BTreeMap::new(),
            records: Vec::new(),
            verification_results: BTreeMap::new(),
        }
    }

    /// The record of a deployed unit. Records without an address do not count.
    pub fn deployed(&self, name: &str) -> Option<&DeploymentRecord> {
        self.records
            .iter()
            .find(|record| record.name == name && !record.address.is_empty())
    }

    pub fn address_of(&self, name: &str) -> Option<&str> {
        self.deployed(name).map(|record| record.address.as_str())
    }
}

/// What happened to a unit's deployment during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(tag = "status", content = "reason", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DeploymentOutcome {
    Deployed,
    SkippedAlreadyDeployed,
    Failed(String),
    /// The run stopped before reaching this unit.
    NotAttempted,
}

/// Per-unit outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub name: String,
    pub deployment: DeploymentOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Why a run ended in [`RunStatus::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// The unit being processed when the run failed, if any.
    pub unit: Option<String>,
    pub error: String,
}

/// Result of a run handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub report: DeploymentReport,
    /// One entry per unit, in resolved order.
    pub outcomes: Vec<UnitOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn outcome(&self, name: &str) -> Option<&UnitOutcome> {
        self.outcomes.iter().find(|outcome| outcome.name == name)
    }

    /// Render the per-unit outcomes as a table.
    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Unit", "Deployment", "Address", "Transaction", "Verification"]);

        for outcome in &self.outcomes {
            let record = self.report.deployed(&outcome.name);
            let deployment = match &outcome.deployment {
                DeploymentOutcome::Failed(reason) => format!("failed: {}", reason),
                other => other.to_string(),
            };

            table.add_row(vec![
                outcome.name.clone(),
                deployment,
                record.map(|r| r.address.clone()).unwrap_or_default(),
                record.map(|r| r.transaction_id.to_string()).unwrap_or_default(),
                outcome
                    .verification
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            ]);
        }

        table
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Network: {}", self.report.network)?;
        writeln!(f, "Status:  {}", self.status)?;
        if let Some(failure) = &self.failure {
            match &failure.unit {
                Some(unit) => writeln!(f, "Failed at `{}`: {}", unit, failure.error)?,
                None => writeln!(f, "Failed: {}", failure.error)?,
            }
        }
        write!(f, "{}", self.table())
    }
}
