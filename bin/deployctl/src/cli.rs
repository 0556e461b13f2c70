use std::path::PathBuf;

use clap::{ArgAction, Parser};
use deployctl_deploy::DeployConfig;
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "deployctl")]
#[command(
    author,
    version,
    about = "Deploy interdependent contracts in dependency order"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "DEPLOYCTL_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// The target network. Also names the deployment report.
    #[arg(short, long, env = "DEPLOYCTL_NETWORK")]
    pub network: Option<String>,

    /// The file describing the deployment units (TOML, or JSON with a `.json` extension).
    #[arg(short, long, env = "DEPLOYCTL_UNITS_FILE")]
    pub units_file: PathBuf,

    /// Confirmations required before a deployment is considered final.
    #[arg(long)]
    pub confirmations: Option<u64>,

    /// Verify deployed contracts with the block explorer.
    ///
    /// Always skipped on local networks.
    #[arg(long, action = ArgAction::Set)]
    pub verify: Option<bool>,

    /// The JSON-RPC endpoint of the target network.
    #[arg(long, alias = "rpc")]
    pub rpc_url: Option<Url>,

    /// Path to the configuration file. Defaults to `deployctl.toml` when present.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding the per-network deployment reports.
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    /// Ignore the persisted deployments of the network and deploy every unit again.
    #[arg(long, default_value_t = false)]
    pub redeploy: bool,

    /// Print the run report as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl Cli {
    /// Override the loaded configuration with the flags given on the command line.
    pub fn apply(&self, config: &mut DeployConfig) {
        if let Some(network) = &self.network {
            config.network = network.clone();
        }
        if let Some(confirmations) = self.confirmations {
            config.confirmations = confirmations;
        }
        if let Some(verify) = self.verify {
            config.verify = verify;
        }
        if let Some(rpc_url) = &self.rpc_url {
            config.rpc_url = rpc_url.clone();
        }
        if let Some(store_dir) = &self.store_dir {
            config.store_dir = store_dir.clone();
        }
    }
}
