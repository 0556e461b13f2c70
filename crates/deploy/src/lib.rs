//! deployctl-deploy - Dependency-ordered contract deployment.
//!
//! This crate resolves a set of interdependent contract deployments into a
//! deployable order, deploys them one by one, records the resulting addresses
//! per network and verifies the deployed contracts with a block explorer.

mod cancel;
pub use cancel::Cancellation;

mod config;
pub use config::{CONFIG_FILENAME, DeployConfig, DeploymentConfigHash, ENV_PREFIX};

mod confirmation;
pub use confirmation::{Confirmed, ConfirmationWaiter, DEFAULT_POLL_INTERVAL};

mod error;
pub use error::{DeployError, ExplorerError, NetworkError};

pub mod explorer;
mod fs;
pub mod network;

mod orchestrator;
pub use orchestrator::Orchestrator;

mod recorder;
pub use recorder::DeploymentRecorder;

mod report;
pub use report::{
    DeploymentOutcome, DeploymentRecord, DeploymentReport, RunFailure, RunReport, RunStatus,
    UnitOutcome, VerificationResult, VerificationStatus,
};

pub mod resolver;
pub mod rpc;
pub mod store;

pub mod unit;
pub use unit::{ArgSpec, ArgValue, DeploymentUnit, load_units};

mod verification;
pub use verification::VerificationAgent;
