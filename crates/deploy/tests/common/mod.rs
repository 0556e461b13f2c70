//! In-memory collaborators for driving the orchestrator in tests.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use deployctl_deploy::{
    ArgSpec, DeployConfig, DeployError, DeploymentReport, DeploymentUnit, ExplorerError,
    NetworkError, Orchestrator,
    explorer::{ExplorerClient, VerificationRequest},
    network::{DeployPayload, NetworkClient, TxId, TxStatus},
    store::{FileReportStore, ReportStore},
};

pub const DEPLOYER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

/// How the mock network treats the transactions of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Confirm,
    /// Never mined.
    Pending,
    Revert,
    RejectSubmission,
}

#[derive(Debug, Default)]
struct NetworkState {
    behaviors: HashMap<String, Behavior>,
    submissions: Vec<String>,
    transactions: HashMap<TxId, (String, String)>,
    /// Depth reported for every known transaction, 12 when unset.
    confirmations: Option<u64>,
}

/// Network that mines contract creations instantly, unless told otherwise.
#[derive(Debug, Clone, Default)]
pub struct MockNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behavior(&self, unit: &str, behavior: Behavior) {
        self.state
            .lock()
            .unwrap()
            .behaviors
            .insert(unit.to_string(), behavior);
    }

    pub fn set_confirmations(&self, confirmations: u64) {
        self.state.lock().unwrap().confirmations = Some(confirmations);
    }

    /// Units submitted so far, in submission order.
    pub fn submissions(&self) -> Vec<String> {
        self.state.lock().unwrap().submissions.clone()
    }

    fn behavior(&self, unit: &str) -> Behavior {
        self.state
            .lock()
            .unwrap()
            .behaviors
            .get(unit)
            .copied()
            .unwrap_or(Behavior::Confirm)
    }
}

impl NetworkClient for MockNetwork {
    fn deployer(&self) -> &str {
        DEPLOYER
    }

    async fn submit_transaction(&self, payload: &DeployPayload) -> Result<TxId, NetworkError> {
        if self.behavior(&payload.unit) == Behavior::RejectSubmission {
            return Err(anyhow::anyhow!("insufficient funds for gas").into());
        }

        let mut state = self.state.lock().unwrap();
        state.submissions.push(payload.unit.clone());
        let nonce = state.submissions.len();
        let tx = TxId(format!("0x{:064x}", nonce));
        let address = format!("0x{:040x}", 0x1000 + nonce);
        state
            .transactions
            .insert(tx.clone(), (payload.unit.clone(), address));
        Ok(tx)
    }

    async fn confirmation_count(&self, tx: &TxId) -> Result<u64, NetworkError> {
        let state = self.state.lock().unwrap();
        match state.transactions.get(tx) {
            Some(_) => Ok(state.confirmations.unwrap_or(12)),
            None => Err(NetworkError::NotFound),
        }
    }

    async fn transaction_status(&self, tx: &TxId) -> Result<TxStatus, NetworkError> {
        let (unit, address) = self
            .state
            .lock()
            .unwrap()
            .transactions
            .get(tx)
            .cloned()
            .ok_or(NetworkError::NotFound)?;

        Ok(match self.behavior(&unit) {
            Behavior::Confirm => TxStatus::Success {
                contract_address: address,
            },
            Behavior::Pending | Behavior::RejectSubmission => TxStatus::Pending,
            Behavior::Revert => TxStatus::Reverted,
        })
    }
}

/// Explorer answering every request the same way.
#[derive(Debug, Clone)]
pub struct MockExplorer {
    response: fn() -> Result<(), ExplorerError>,
    calls: Arc<AtomicUsize>,
}

impl MockExplorer {
    pub fn accepting() -> Self {
        Self::answering(|| Ok(()))
    }

    pub fn answering(response: fn() -> Result<(), ExplorerError>) -> Self {
        Self {
            response,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExplorerClient for MockExplorer {
    async fn verify(&self, _request: &VerificationRequest) -> Result<(), ExplorerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.response)()
    }
}

/// File store whose saves can be made to fail.
#[derive(Debug, Clone)]
pub struct FlakyStore {
    inner: FileReportStore,
    failing: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            inner: FileReportStore::new(dir),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail_saves(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

impl ReportStore for FlakyStore {
    type Lease = <FileReportStore as ReportStore>::Lease;

    fn acquire_lease(&self, network: &str) -> Result<Self::Lease, DeployError> {
        self.inner.acquire_lease(network)
    }

    fn load(&self, network: &str) -> Result<Option<DeploymentReport>, DeployError> {
        self.inner.load(network)
    }

    fn save(&self, report: &DeploymentReport) -> Result<(), DeployError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeployError::PersistenceWriteError {
                path: self.inner.dir().join(format!("{}.json", report.network)),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.inner.save(report)
    }
}

/// Fast-polling configuration for `network`.
pub fn config(network: &str) -> DeployConfig {
    DeployConfig {
        network: network.to_string(),
        poll_interval_ms: 1,
        confirmation_timeout_secs: 1,
        verification_timeout_secs: 5,
        ..Default::default()
    }
}

pub fn orchestrator<X: ExplorerClient, S: ReportStore>(
    network: &MockNetwork,
    explorer: X,
    store: S,
    config: DeployConfig,
) -> Orchestrator<MockNetwork, X, S> {
    Orchestrator::new(network.clone(), explorer, store, config)
}

/// `A` with no dependencies, `B` depending on `A`, `C` depending on both.
pub fn abc_units() -> Vec<DeploymentUnit> {
    vec![
        DeploymentUnit::new("A").bytecode(vec![0x60, 0x80]),
        DeploymentUnit::new("B")
            .bytecode(vec![0x60, 0x80])
            .arg(ArgSpec::address_of("A")),
        DeploymentUnit::new("C")
            .bytecode(vec![0x60, 0x80])
            .arg(ArgSpec::address_of("A"))
            .arg(ArgSpec::address_of("B")),
    ]
}
