//! Durable, network-keyed storage for deployment reports.

use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use fs2::FileExt;

use crate::{DeployError, DeploymentReport, fs::FsHandler};

/// Storage for one report per network.
///
/// `load` must distinguish an absent report (`None`) from a stored report
/// without records, and `save` must replace the stored report atomically.
pub trait ReportStore: Send + Sync {
    /// Exclusive write lease on a network's report, released on drop.
    type Lease: Send;

    /// Take the write lease for `network`, failing with
    /// [`DeployError::RunInProgress`] if another run holds it.
    fn acquire_lease(&self, network: &str) -> Result<Self::Lease, DeployError>;

    fn load(&self, network: &str) -> Result<Option<DeploymentReport>, DeployError>;

    fn save(&self, report: &DeploymentReport) -> Result<(), DeployError>;
}

/// Stores reports as `<dir>/<network>.json`.
#[derive(Debug, Clone)]
pub struct FileReportStore {
    dir: PathBuf,
}

/// Lease backed by an exclusive lock on `<dir>/<network>.lock`.
#[derive(Debug)]
pub struct FileLease {
    file: File,
    path: PathBuf,
}

impl Drop for FileLease {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %err, "Failed to release deployment lease");
        }
    }
}

impl FileReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the report for `network`.
    pub fn report_path(&self, network: &str) -> Result<PathBuf, DeployError> {
        Ok(self.dir.join(format!("{}.json", file_stem(network)?)))
    }

    fn lock_path(&self, network: &str) -> Result<PathBuf, DeployError> {
        Ok(self.dir.join(format!("{}.lock", file_stem(network)?)))
    }

    fn write_error(path: PathBuf) -> impl FnOnce(io::Error) -> DeployError {
        move |source| DeployError::PersistenceWriteError { path, source }
    }
}

/// Network identifiers become file names verbatim; anything outside
/// `[A-Za-z0-9._-]`, or starting with a dot, is rejected.
fn file_stem(network: &str) -> Result<&str, DeployError> {
    let valid = !network.is_empty()
        && !network.starts_with('.')
        && network
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(network)
    } else {
        Err(DeployError::InvalidNetwork(network.to_string()))
    }
}

impl ReportStore for FileReportStore {
    type Lease = FileLease;

    fn acquire_lease(&self, network: &str) -> Result<FileLease, DeployError> {
        let path = self.lock_path(network)?;
        FsHandler::create_dir(&self.dir).map_err(Self::write_error(self.dir.clone()))?;

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(Self::write_error(path.clone()))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                tracing::debug!(network, path = %path.display(), "Acquired deployment lease");
                Ok(FileLease { file, path })
            }
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                Err(DeployError::RunInProgress(network.to_string()))
            }
            Err(err) => Err(Self::write_error(path)(err)),
        }
    }

    fn load(&self, network: &str) -> Result<Option<DeploymentReport>, DeployError> {
        let path = self.report_path(network)?;

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(DeployError::PersistenceReadError {
                    path,
                    reason: err.to_string(),
                });
            }
        };

        let report = serde_json::from_str(&content).map_err(|err| {
            DeployError::PersistenceReadError {
                path: path.clone(),
                reason: err.to_string(),
            }
        })?;

        tracing::debug!(network, path = %path.display(), "Loaded deployment report");

        Ok(Some(report))
    }

    fn save(&self, report: &DeploymentReport) -> Result<(), DeployError> {
        let path = self.report_path(&report.network)?;
        let json = serde_json::to_vec_pretty(report)
            .map_err(|err| Self::write_error(path.clone())(err.into()))?;

        FsHandler::create_dir(&self.dir).map_err(Self::write_error(self.dir.clone()))?;
        FsHandler::write_atomic(&path, &json).map_err(Self::write_error(path.clone()))?;

        tracing::debug!(network = %report.network, path = %path.display(), records = report.records.len(), "Deployment report saved");

        Ok(())
    }
}
