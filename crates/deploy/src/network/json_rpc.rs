//! [`NetworkClient`] over plain Ethereum JSON-RPC.
//!
//! Transactions are sent with `eth_sendTransaction`, so the node signs them
//! with one of its unlocked accounts. No key material passes through here.

use serde::Deserialize;
use url::Url;

use super::{DeployPayload, NetworkClient, TxId, TxStatus};
use crate::{NetworkError, rpc};

/// Subset of a transaction receipt needed to track a deployment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    block_number: Option<String>,
    status: Option<String>,
    contract_address: Option<String>,
}

/// JSON-RPC backed network client.
#[derive(Debug, Clone)]
pub struct JsonRpcNetwork {
    client: reqwest::Client,
    url: Url,
    deployer: String,
}

impl JsonRpcNetwork {
    /// Connect to `url`, signing as `deployer` or, when `None`, as the node's
    /// first unlocked account.
    pub async fn connect(url: Url, deployer: Option<String>) -> anyhow::Result<Self> {
        let client = rpc::create_client()?;

        let deployer = match deployer {
            Some(deployer) => deployer,
            None => {
                let accounts: Vec<String> =
                    rpc::json_rpc_call(&client, url.as_str(), "eth_accounts", vec![]).await?;
                accounts
                    .into_iter()
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Node at {} exposes no unlocked account", url))?
            }
        };

        tracing::info!(rpc_url = %url, deployer = %deployer, "Connected to network");

        Ok(Self {
            client,
            url,
            deployer,
        })
    }

    async fn receipt(&self, tx: &TxId) -> Result<Option<Receipt>, NetworkError> {
        Ok(rpc::json_rpc_call(
            &self.client,
            self.url.as_str(),
            "eth_getTransactionReceipt",
            vec![serde_json::json!(tx.0)],
        )
        .await?)
    }
}

impl NetworkClient for JsonRpcNetwork {
    fn deployer(&self) -> &str {
        &self.deployer
    }

    async fn submit_transaction(&self, payload: &DeployPayload) -> Result<TxId, NetworkError> {
        let tx_hash: String = rpc::json_rpc_call(
            &self.client,
            self.url.as_str(),
            "eth_sendTransaction",
            vec![serde_json::json!({
                "from": self.deployer,
                "data": payload.data,
            })],
        )
        .await?;

        Ok(TxId(tx_hash))
    }

    async fn confirmation_count(&self, tx: &TxId) -> Result<u64, NetworkError> {
        let receipt = self.receipt(tx).await?.ok_or(NetworkError::NotFound)?;
        let Some(block) = receipt.block_number else {
            return Err(NetworkError::NotFound);
        };
        let included = rpc::parse_quantity(&block)?;

        let head: String =
            rpc::json_rpc_call(&self.client, self.url.as_str(), "eth_blockNumber", vec![]).await?;
        let head = rpc::parse_quantity(&head)?;

        Ok(head.saturating_sub(included) + 1)
    }

    async fn transaction_status(&self, tx: &TxId) -> Result<TxStatus, NetworkError> {
        let Some(receipt) = self.receipt(tx).await? else {
            return Ok(TxStatus::Pending);
        };

        match receipt.status.as_deref() {
            Some("0x1") => match receipt.contract_address {
                Some(contract_address) => Ok(TxStatus::Success { contract_address }),
                None => Err(anyhow::anyhow!("Receipt for {} has no contract address", tx).into()),
            },
            Some("0x0") => Ok(TxStatus::Reverted),
            _ if receipt.block_number.is_none() => Ok(TxStatus::Pending),
            other => Err(anyhow::anyhow!("Unexpected receipt status {:?} for {}", other, tx).into()),
        }
    }
}
