//! Network collaborator: submits deployment transactions and reports their
//! inclusion depth and outcome.

mod json_rpc;

use std::future::Future;

use alloy_core::primitives::Bytes;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

pub use json_rpc::JsonRpcNetwork;

use crate::NetworkError;

/// Identifier of a submitted transaction (its hash on EVM networks).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub String);

impl From<&str> for TxId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A contract-creation transaction.
#[derive(Debug, Clone)]
pub struct DeployPayload {
    /// Logical unit name, for logging and test doubles.
    pub unit: String,
    /// Creation bytecode followed by the ABI-encoded constructor arguments.
    pub data: Bytes,
}

/// On-chain outcome of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Not yet included in a block.
    Pending,
    /// Included and executed successfully.
    Success { contract_address: String },
    /// Included but reverted.
    Reverted,
}

/// Network RPC client with a signing identity.
///
/// Implementations must not retry submissions themselves: once a transaction
/// is broadcast it cannot be revoked.
pub trait NetworkClient: Send + Sync {
    /// Identity that signs the deployment transactions.
    fn deployer(&self) -> &str;

    /// Broadcast a contract-creation transaction.
    fn submit_transaction(
        &self,
        payload: &DeployPayload,
    ) -> impl Future<Output = Result<TxId, NetworkError>> + Send;

    /// Number of blocks including and built on top of the transaction's block.
    ///
    /// Fails with [`NetworkError::NotFound`] while the transaction is not mined.
    fn confirmation_count(
        &self,
        tx: &TxId,
    ) -> impl Future<Output = Result<u64, NetworkError>> + Send;

    /// Current status of the transaction.
    fn transaction_status(
        &self,
        tx: &TxId,
    ) -> impl Future<Output = Result<TxStatus, NetworkError>> + Send;
}
