//! Block-explorer verification collaborator.

mod etherscan;

use std::future::Future;

pub use etherscan::EtherscanExplorer;

use crate::ExplorerError;

/// Everything an explorer needs to match deployed bytecode with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub unit: String,
    pub address: String,
    /// `path/File.sol:Contract`, or a bare contract name.
    pub source_ref: String,
    /// Hex-encoded ABI constructor arguments, without `0x`.
    pub constructor_args: String,
}

/// Explorer service able to verify a deployed contract.
pub trait ExplorerClient: Send + Sync {
    fn verify(
        &self,
        request: &VerificationRequest,
    ) -> impl Future<Output = Result<(), ExplorerError>> + Send;
}

/// An absent explorer rejects every request. Runs without verification never
/// reach it.
impl<X: ExplorerClient> ExplorerClient for Option<X> {
    async fn verify(&self, request: &VerificationRequest) -> Result<(), ExplorerError> {
        match self {
            Some(explorer) => explorer.verify(request).await,
            None => Err(anyhow::anyhow!("no block explorer configured").into()),
        }
    }
}
