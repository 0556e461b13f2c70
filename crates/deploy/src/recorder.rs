//! Incremental, write-through recording of a run's deployments.

use crate::{
    DeployError, DeploymentRecord, DeploymentReport, VerificationResult, store::ReportStore,
};

/// Owns the in-memory report of a run and mirrors every change to storage.
pub struct DeploymentRecorder<'a, S: ReportStore> {
    store: &'a S,
    report: DeploymentReport,
}

impl<'a, S: ReportStore> DeploymentRecorder<'a, S> {
    pub fn new(store: &'a S, report: DeploymentReport) -> Self {
        Self { store, report }
    }

    /// The previously persisted report of `network`, if any.
    pub fn load(store: &S, network: &str) -> Result<Option<DeploymentReport>, DeployError> {
        store.load(network)
    }

    pub fn report(&self) -> &DeploymentReport {
        &self.report
    }

    pub fn into_report(self) -> DeploymentReport {
        self.report
    }

    /// Add a record and write the report through to storage.
    ///
    /// A record for the same unit name replaces the existing one in place. The
    /// record stays in memory even when the write fails.
    pub fn append(&mut self, record: DeploymentRecord) -> Result<(), DeployError> {
        tracing::debug!(unit = %record.name, address = %record.address, "Recording deployment");

        match self
            .report
            .records
            .iter_mut()
            .find(|existing| existing.name == record.name)
        {
            Some(existing) => *existing = record,
            None => self.report.records.push(record),
        }

        self.flush()
    }

    /// Store a unit's verification result and write the report through.
    pub fn record_verification(
        &mut self,
        name: &str,
        result: VerificationResult,
    ) -> Result<(), DeployError> {
        self.report
            .verification_results
            .insert(name.to_string(), result);
        self.flush()
    }

    /// Persist the current report.
    pub fn flush(&self) -> Result<(), DeployError> {
        self.store.save(&self.report)
    }
}
