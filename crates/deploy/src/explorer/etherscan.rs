//! Etherscan-compatible verification API.
//!
//! Sources are taken from Hardhat build-info files: the one whose output
//! contains the requested contract provides the standard-JSON input and the
//! exact compiler version.

use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{ExplorerClient, VerificationRequest};
use crate::ExplorerError;

/// Default interval between two `checkverifystatus` polls.
const DEFAULT_STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of `checkverifystatus` polls before giving up.
const DEFAULT_STATUS_POLLS: usize = 12;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

impl ApiResponse {
    fn result_text(&self) -> String {
        match &self.result {
            Value::String(text) => text.clone(),
            other => format!("{} {}", self.message, other),
        }
    }
}

/// Compiler input and version of one contract.
#[derive(Debug)]
struct BuildInfo {
    input: Value,
    solc_long_version: String,
}

/// Status of a submitted verification.
#[derive(Debug)]
enum CheckError {
    Pending,
    Failed(ExplorerError),
}

/// Client for the Etherscan `contract` module.
#[derive(Debug, Clone)]
pub struct EtherscanExplorer {
    client: reqwest::Client,
    api_url: Url,
    api_key: String,
    build_info_dir: PathBuf,
    poll_interval: Duration,
    max_polls: usize,
}

impl EtherscanExplorer {
    pub fn new(
        api_url: Url,
        api_key: impl Into<String>,
        build_info_dir: impl Into<PathBuf>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: crate::rpc::create_client()?,
            api_url,
            api_key: api_key.into(),
            build_info_dir: build_info_dir.into(),
            poll_interval: DEFAULT_STATUS_POLL_INTERVAL,
            max_polls: DEFAULT_STATUS_POLLS,
        })
    }

    /// Find the build-info file that compiled `source:contract`.
    fn find_build_info(&self, source: &str, contract: &str) -> anyhow::Result<BuildInfo> {
        let entries = std::fs::read_dir(&self.build_info_dir).with_context(|| {
            format!(
                "Failed to read build info directory {}",
                self.build_info_dir.display()
            )
        })?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read build info {}", path.display()))?;
            let mut info: Value = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse build info {}", path.display()))?;

            if info["output"]["contracts"][source][contract].is_null() {
                continue;
            }

            let solc_long_version = info["solcLongVersion"]
                .as_str()
                .context("Build info has no solcLongVersion")?
                .to_string();

            return Ok(BuildInfo {
                input: info["input"].take(),
                solc_long_version,
            });
        }

        anyhow::bail!(
            "No build info in {} compiles {}:{}",
            self.build_info_dir.display(),
            source,
            contract
        )
    }

    async fn submit(&self, request: &VerificationRequest) -> Result<String, ExplorerError> {
        let (source, contract) = request.source_ref.rsplit_once(':').ok_or_else(|| {
            ExplorerError::Other(anyhow::anyhow!(
                "Source reference `{}` is not of the form path:Contract",
                request.source_ref
            ))
        })?;
        let build_info = self.find_build_info(source, contract)?;

        let source_code = serde_json::to_string(&build_info.input)
            .context("Failed to serialize compiler input")?;
        let compiler_version = format!("v{}", build_info.solc_long_version);

        let response: ApiResponse = self
            .client
            .post(self.api_url.clone())
            .form(&[
                ("apikey", self.api_key.as_str()),
                ("module", "contract"),
                ("action", "verifysourcecode"),
                ("contractaddress", request.address.as_str()),
                ("sourceCode", source_code.as_str()),
                ("codeformat", "solidity-standard-json-input"),
                ("contractname", request.source_ref.as_str()),
                ("compilerversion", compiler_version.as_str()),
                ("constructorArguements", request.constructor_args.as_str()),
            ])
            .send()
            .await
            .context("Failed to send verification request")?
            .json()
            .await
            .context("Failed to parse verification response")?;

        if response.status != "1" {
            return Err(classify(&response.result_text()));
        }

        response
            .result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ExplorerError::Other(anyhow::anyhow!("Verification response has no GUID")))
    }

    async fn check(&self, guid: &str) -> Result<(), CheckError> {
        let response: ApiResponse = self
            .client
            .get(self.api_url.clone())
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .context("Failed to query verification status")
            .map_err(|e| CheckError::Failed(e.into()))?
            .json()
            .await
            .context("Failed to parse verification status")
            .map_err(|e| CheckError::Failed(e.into()))?;

        let text = response.result_text();
        if response.status == "1" {
            return Ok(());
        }
        if text.to_lowercase().contains("pending") {
            return Err(CheckError::Pending);
        }
        Err(CheckError::Failed(classify(&text)))
    }
}

/// Map an explorer error text to an [`ExplorerError`] class.
fn classify(text: &str) -> ExplorerError {
    let lower = text.to_lowercase();
    if lower.contains("already verified") {
        ExplorerError::AlreadyVerified
    } else if lower.contains("rate limit") {
        ExplorerError::RateLimited(text.to_string())
    } else if lower.contains("unable to verify")
        || lower.contains("bytecode")
        || lower.contains("does not match")
    {
        ExplorerError::SourceMismatch(text.to_string())
    } else {
        ExplorerError::Other(anyhow::anyhow!("{}", text))
    }
}

impl ExplorerClient for EtherscanExplorer {
    async fn verify(&self, request: &VerificationRequest) -> Result<(), ExplorerError> {
        let guid = self.submit(request).await?;
        tracing::debug!(unit = %request.unit, guid = %guid, "Verification submitted");

        (|| self.check(&guid))
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.poll_interval)
                    .with_max_times(self.max_polls),
            )
            .when(|err: &CheckError| matches!(err, CheckError::Pending))
            .await
            .map_err(|err| match err {
                CheckError::Pending => ExplorerError::Other(anyhow::anyhow!(
                    "Verification still pending after {} checks",
                    self.max_polls
                )),
                CheckError::Failed(err) => err,
            })
    }
}
