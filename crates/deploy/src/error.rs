//! Error taxonomy for a deployment run.

use std::{path::PathBuf, time::Duration};

/// Errors produced by the deployment pipeline.
///
/// Pre-flight variants (`CyclicDependency`, `UnknownReference`, `DuplicateUnit`,
/// `RunInProgress`, `InvalidNetwork`, `PersistenceReadError`) are raised before any network call.
/// The remaining variants abort the run mid-way while keeping every record that
/// was already appended.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("cyclic dependency between units: {}", .members.join(" -> "))]
    CyclicDependency { members: Vec<String> },

    #[error("unit `{unit}` references unknown unit `{reference}`")]
    UnknownReference { unit: String, reference: String },

    #[error("unit `{0}` is declared more than once")]
    DuplicateUnit(String),

    #[error("failed to encode constructor argument {index} of `{unit}`: {reason}")]
    ArgumentEncoding {
        unit: String,
        index: usize,
        reason: String,
    },

    #[error("failed to submit deployment transaction for `{unit}`: {source}")]
    Submission {
        unit: String,
        #[source]
        source: NetworkError,
    },

    #[error("transaction {tx} for `{unit}` was not confirmed within {timeout:?}")]
    ConfirmationTimeout {
        unit: String,
        tx: String,
        timeout: Duration,
    },

    #[error("transaction {tx} for `{unit}` reverted on-chain")]
    TransactionReverted { unit: String, tx: String },

    #[error("failed to persist deployment report to {}: {source}", .path.display())]
    PersistenceWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read deployment report from {}: {reason}", .path.display())]
    PersistenceReadError { path: PathBuf, reason: String },

    #[error("another run already holds the deployment lease for network `{0}`")]
    RunInProgress(String),

    #[error("invalid network identifier `{0}`: use letters, digits, `-`, `_` and `.`")]
    InvalidNetwork(String),

    #[error("run cancelled")]
    Cancelled,
}

impl DeployError {
    /// Whether the error was raised before any on-chain effect could happen.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::CyclicDependency { .. }
                | Self::UnknownReference { .. }
                | Self::DuplicateUnit(_)
                | Self::RunInProgress(_)
                | Self::InvalidNetwork(_)
                | Self::PersistenceReadError { .. }
        )
    }
}

/// Errors reported by the network client.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// The node does not know the transaction (yet).
    #[error("transaction not found")]
    NotFound,

    /// Any other RPC failure. Treated as transient while polling.
    #[error(transparent)]
    Rpc(#[from] anyhow::Error),
}

/// Errors reported by the block-explorer verification service.
#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    #[error("contract source is already verified")]
    AlreadyVerified,

    #[error("explorer rate limit reached: {0}")]
    RateLimited(String),

    #[error("explorer rejected the source: {0}")]
    SourceMismatch(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
