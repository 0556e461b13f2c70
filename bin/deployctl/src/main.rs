//! deployctl deploys a set of interdependent contracts in dependency order and
//! keeps a per-network record of their addresses.

mod cli;

use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;

use cli::Cli;
use deployctl_deploy::{
    CONFIG_FILENAME, Cancellation, DeployConfig, Orchestrator, explorer::EtherscanExplorer,
    load_units, network::JsonRpcNetwork, store::FileReportStore,
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILENAME));
    let mut config = DeployConfig::load(Some(&config_path))?;
    cli.apply(&mut config);

    let units = load_units(&cli.units_file)?;

    let explorer = if config.verification_enabled() {
        explorer_from_config(&mut config)?
    } else {
        None
    };

    tracing::info!(
        network = %config.network,
        rpc_url = %config.rpc_url,
        units_file = %cli.units_file.display(),
        verify = config.verification_enabled(),
        "Loading deployment..."
    );

    let network = JsonRpcNetwork::connect(config.rpc_url.clone(), config.deployer.clone())
        .await
        .context("Failed to connect to the target network")?;
    let store = FileReportStore::new(&config.store_dir);
    let orchestrator = Orchestrator::new(network, explorer, store, config).redeploy(cli.redeploy);

    let cancel = Cancellation::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping at the next wait");
            on_interrupt.cancel();
        }
    });

    let run = orchestrator.run(&units, &cancel).await?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&run).context("Failed to serialize run report")?
        );
    } else {
        println!("{}", run);
    }

    Ok(if run.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Build the explorer client, turning verification off when the explorer is
/// not fully configured.
fn explorer_from_config(config: &mut DeployConfig) -> Result<Option<EtherscanExplorer>> {
    let Some(api_url) = config.explorer_api_url.clone() else {
        tracing::warn!("No explorer API URL configured, verification disabled");
        config.verify = false;
        return Ok(None);
    };

    let Ok(api_key) = std::env::var(&config.explorer_api_key_env) else {
        tracing::warn!(
            env = %config.explorer_api_key_env,
            "Explorer API key not set, verification disabled"
        );
        config.verify = false;
        return Ok(None);
    };

    Ok(Some(EtherscanExplorer::new(
        api_url,
        api_key,
        config.build_info_dir.clone(),
    )?))
}
