//! Run configuration.
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `DEPLOYCTL_*` environment variables. Callers apply CLI overrides on top of
//! the extracted value.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// The default name for the configuration file.
pub const CONFIG_FILENAME: &str = "deployctl.toml";

/// Prefix of the environment variables read by [`DeployConfig::figment`].
pub const ENV_PREFIX: &str = "DEPLOYCTL_";

/// Configuration of a deployment run. Read-only once a run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Target network identifier, also the key of the persisted report.
    pub network: String,
    /// JSON-RPC endpoint of the target network.
    pub rpc_url: Url,
    /// Unlocked account used to deploy. Defaults to the node's first account.
    pub deployer: Option<String>,
    /// Confirmations required before a deployment is final.
    pub confirmations: u64,
    /// Extra confirmations awaited before verification, for explorer indexing lag.
    pub verification_margin: u64,
    pub confirmation_timeout_secs: u64,
    pub verification_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Verify deployed contracts. Ignored on local networks.
    pub verify: bool,
    /// Networks considered ephemeral.
    pub local_networks: Vec<String>,
    /// Etherscan-compatible API endpoint.
    pub explorer_api_url: Option<Url>,
    /// Name of the environment variable holding the explorer API key.
    pub explorer_api_key_env: String,
    /// Hardhat build-info directory used as the verification source.
    pub build_info_dir: PathBuf,
    /// Directory holding the per-network reports.
    pub store_dir: PathBuf,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            network: "localhost".to_string(),
            rpc_url: Url::parse("http://localhost:8545").expect("static URL is valid"),
            deployer: None,
            confirmations: 1,
            verification_margin: 5,
            confirmation_timeout_secs: 300,
            verification_timeout_secs: 600,
            poll_interval_ms: 2000,
            verify: true,
            local_networks: vec![
                "hardhat".to_string(),
                "localhost".to_string(),
                "anvil".to_string(),
            ],
            explorer_api_url: None,
            explorer_api_key_env: "ETHERSCAN_API_KEY".to_string(),
            build_info_dir: PathBuf::from("artifacts/build-info"),
            store_dir: PathBuf::from("deployments"),
        }
    }
}

impl DeployConfig {
    /// The layered configuration sources, with `path` as the optional TOML file.
    pub fn figment(path: Option<&Path>) -> Figment {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        let figment = match path {
            Some(path) => figment.merge(Toml::file(path)),
            None => figment,
        };
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load the configuration from defaults, `path` and the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::figment(path)
            .extract()
            .context("Failed to load deployment configuration")
    }

    /// Whether the target network is ephemeral.
    pub fn is_local(&self) -> bool {
        self.local_networks.iter().any(|n| n == &self.network)
    }

    /// Whether verification should be attempted at all.
    pub fn verification_enabled(&self) -> bool {
        self.verify && !self.is_local()
    }

    /// Total confirmations awaited before verification.
    pub fn verification_confirmations(&self) -> u64 {
        self.confirmations.max(1) + self.verification_margin
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_secs(self.verification_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Flat key/value view recorded in the deployment report.
    ///
    /// Only the name of the API key variable is included, never its value.
    pub fn as_flat(&self) -> BTreeMap<String, String> {
        let mut flat = BTreeMap::from([
            ("network".to_string(), self.network.clone()),
            ("rpc_url".to_string(), self.rpc_url.to_string()),
            ("confirmations".to_string(), self.confirmations.to_string()),
            (
                "verification_margin".to_string(),
                self.verification_margin.to_string(),
            ),
            (
                "confirmation_timeout_secs".to_string(),
                self.confirmation_timeout_secs.to_string(),
            ),
            (
                "verification_timeout_secs".to_string(),
                self.verification_timeout_secs.to_string(),
            ),
            ("poll_interval_ms".to_string(), self.poll_interval_ms.to_string()),
            ("verify".to_string(), self.verify.to_string()),
            (
                "explorer_api_key_env".to_string(),
                self.explorer_api_key_env.clone(),
            ),
        ]);
        if let Some(deployer) = &self.deployer {
            flat.insert("deployer".to_string(), deployer.clone());
        }
        if let Some(url) = &self.explorer_api_url {
            flat.insert("explorer_api_url".to_string(), url.to_string());
        }
        flat
    }
}

/// Configuration parameters that identify a set of deployments.
///
/// Records produced under a different hash were deployed by another identity
/// or for another network, and reusing them deserves a warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfigHash {
    pub network: String,
    pub deployer: String,
}

impl DeploymentConfigHash {
    pub fn new(network: impl Into<String>, deployer: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            deployer: deployer.into(),
        }
    }

    /// Compute a SHA-256 hash of this configuration.
    ///
    /// The hash is deterministic - the same configuration always produces the same hash.
    pub fn compute_hash(&self) -> String {
        let json = serde_json::to_string(self)
            .expect("DeploymentConfigHash serialization should never fail");

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());

        hex::encode(hasher.finalize())
    }
}
