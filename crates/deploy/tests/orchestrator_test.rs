//! End-to-end runs of the orchestrator against in-memory collaborators and a
//! file-backed report store.

mod common;

use std::time::Duration;

use common::{Behavior, FlakyStore, MockExplorer, MockNetwork, abc_units, config, orchestrator};
use deployctl_deploy::{
    ArgSpec, Cancellation, DeployError, DeploymentOutcome, DeploymentUnit, ExplorerError,
    RunStatus, VerificationStatus,
    store::{FileReportStore, ReportStore},
};
use tempdir::TempDir;

fn names<'a>(iter: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    iter.collect()
}

#[tokio::test]
async fn test_deploys_in_dependency_order() {
    let temp_dir = TempDir::new("deployctl-test").unwrap();
    let network = MockNetwork::new();
    let mut units = abc_units();
    units.reverse();

    let run = orchestrator(
        &network,
        MockExplorer::accepting(),
        FileReportStore::new(temp_dir.path()),
        config("localhost"),
    )
    .run(&units, &Cancellation::new())
    .await
    .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(network.submissions(), vec!["A", "B", "C"]);
    assert_eq!(
        names(run.report.records.iter().map(|r| r.name.as_str())),
        vec!["A", "B", "C"]
    );
    assert!(run.report.records.iter().all(|r| !r.address.is_empty()));

    // References are substituted with the addresses produced earlier in the run.
    let c = &run.report.records[2];
    assert_eq!(
        c.constructor_args_resolved,
        vec![
            run.report.records[0].address.clone(),
            run.report.records[1].address.clone()
        ]
    );

    // Local networks are never verified.
    for outcome in &run.outcomes {
        assert_eq!(outcome.deployment, DeploymentOutcome::Deployed);
        assert_eq!(
            outcome.verification.as_ref().map(|v| v.status),
            Some(VerificationStatus::Skipped)
        );
    }

    let persisted = FileReportStore::new(temp_dir.path())
        .load("localhost")
        .unwrap()
        .unwrap();
    assert_eq!(persisted, run.report);
}

#[tokio::test]
async fn test_cycle_fails_before_any_network_call() {
    let temp_dir = TempDir::new("deployctl-test").unwrap();
    let network = MockNetwork::new();
    let units = vec![
        DeploymentUnit::new("X").arg(ArgSpec::address_of("Y")),
        DeploymentUnit::new("Y").arg(ArgSpec::address_of("X")),
    ];

    let err = orchestrator(
        &network,
        MockExplorer::accepting(),
        FileReportStore::new(temp_dir.path()),
        config("localhost"),
    )
    .run(&units, &Cancellation::new())
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        DeployError::CyclicDependency { ref members } if members == &["X", "Y"]
    ));
    assert!(network.submissions().is_empty());
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0, "nothing is written");
}

#[tokio::test]
async fn test_unknown_reference_fails_before_any_network_call() {
    let temp_dir = TempDir::new("deployctl-test").unwrap();
    let network = MockNetwork::new();
    let units = vec![DeploymentUnit::new("ForgeDAO").arg(ArgSpec::address_of("ForgeREP"))];

    let err = orchestrator(
        &network,
        MockExplorer::accepting(),
        FileReportStore::new(temp_dir.path()),
        config("localhost"),
    )
    .run(&units, &Cancellation::new())
    .await
    .unwrap_err();

    assert!(err.is_preflight());
    assert!(network.submissions().is_empty());
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let temp_dir = TempDir::new("deployctl-test").unwrap();
    let network = MockNetwork::new();
    let units = abc_units();

    let first = orchestrator(
        &network,
        MockExplorer::accepting(),
        FileReportStore::new(temp_dir.path()),
        config("localhost"),
    )
    .run(&units, &Cancellation::new())
    .await
    .unwrap();

    let second = orchestrator(
        &network,
        MockExplorer::accepting(),
        FileReportStore::new(temp_dir.path()),
        config("localhost"),
    )
    .run(&units, &Cancellation::new())
    .await
    .unwrap();

    assert_eq!(network.submissions().len(), 3, "no new transaction on rerun");
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.report, first.report);
    assert!(
        second
            .outcomes
            .iter()
            .all(|o| o.deployment == DeploymentOutcome::SkippedAlreadyDeployed)
    );
}

#[tokio::test]
async fn test_resume_after_confirmation_timeout() {
    let temp_dir = TempDir::new("deployctl-test").unwrap();
    let network = MockNetwork::new();
    network.set_behavior("C", Behavior::Pending);
    let units = abc_units();

    let first = orchestrator(
        &network,
        MockExplorer::accepting(),
        FileReportStore::new(temp_dir.path()),
        config("localhost"),
    )
    .run(&units, &Cancellation::new())
    .await
    .unwrap();

    assert_eq!(first.status, RunStatus::Failed);
    assert_eq!(first.failure.as_ref().unwrap().unit.as_deref(), Some("C"));
    assert!(matches!(
        first.outcome("C").unwrap().deployment,
        DeploymentOutcome::Failed(_)
    ));
    assert_eq!(first.report.records.len(), 2);

    // The timed-out transaction is never recorded as deployed.
    let persisted = FileReportStore::new(temp_dir.path())
        .load("localhost")
        .unwrap()
        .unwrap();
    assert!(persisted.deployed("C").is_none());

    network.set_behavior("C", Behavior::Confirm);
    let second = orchestrator(
        &network,
        MockExplorer::accepting(),
        FileReportStore::new(temp_dir.path()),
        config("localhost"),
    )
    .run(&units, &Cancellation::new())
    .await
    .unwrap();

    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(network.submissions(), vec!["A", "B", "C", "C"]);
    assert_eq!(second.report.records.len(), 3);
    assert_eq!(second.report.records[..2], first.report.records[..]);
    assert_eq!(
        second.outcome("A").unwrap().deployment,
        DeploymentOutcome::SkippedAlreadyDeployed
    );
    assert_eq!(second.outcome("C").unwrap().deployment, DeploymentOutcome::Deployed);
}

#[tokio::test]
async fn test_reverted_unit_stops_the_run() {
    let temp_dir = TempDir::new("deployctl-test").unwrap();
    let network = MockNetwork::new();
    network.set_behavior("B", Behavior::Revert);

    let run = orchestrator(
        &network,
        MockExplorer::accepting(),
        FileReportStore::new(temp_dir.path()),
        config("localhost"),
    )
    .run(&abc_units(), &Cancellation::new())
    .await
    .unwrap();

    assert!(!run.is_success());
    assert_eq!(run.outcome("A").unwrap().deployment, DeploymentOutcome::Deployed);
    assert!(matches!(
        &run.outcome("B").unwrap().deployment,
        DeploymentOutcome::Failed(reason) if reason.contains("reverted")
    ));
    assert_eq!(run.outcome("C").unwrap().deployment, DeploymentOutcome::NotAttempted);
    assert_eq!(network.submissions(), vec!["A", "B"]);
}

#[tokio::test]
async fn test_rejected_submission_fails_the_unit() {
    let temp_dir = TempDir::new("deployctl-test").unwrap();
    let network = MockNetwork::new();
    network.set_behavior("A", Behavior::RejectSubmission);

    let run = orchestrator(
        &network,
        MockExplorer::accepting(),
        FileReportStore::new(temp_dir.path()),
        config("localhost"),
    )
    .run(&abc_units(), &Cancellation::new())
    .await
    .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.report.records.is_empty());
    assert!(run.failure.unwrap().error.contains("insufficient funds"));
}

#[tokio::test]
async fn test_failed_verification_does_not_fail_the_run() {
    let temp_dir = TempDir::new("deployctl-test").unwrap();
    let network = MockNetwork::new();
    let explorer = MockExplorer::answering(|| {
        Err(ExplorerError::SourceMismatch(
            "Fail - Unable to verify".to_string(),
        ))
    });

    let run = orchestrator(
        &network,
        explorer.clone(),
        FileReportStore::new(temp_dir.path()),
        config("sepolia"),
    )
    .run(&abc_units(), &Cancellation::new())
    .await
    .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(explorer.calls(), 3);
    for outcome in &run.outcomes {
        assert_eq!(outcome.deployment, DeploymentOutcome::Deployed);
        assert_eq!(
            outcome.verification.as_ref().unwrap().status,
            VerificationStatus::Failed
        );
    }
    assert_eq!(run.report.verification_results.len(), 3);
}

#[tokio::test]
async fn test_skipped_units_keep_their_verification_result() {
    let temp_dir = TempDir::new("deployctl-test").unwrap();
    let network = MockNetwork::new();
    let explorer = MockExplorer::answering(|| Err(ExplorerError::AlreadyVerified));
    let units = vec![
        DeploymentUnit::new("ForgeREP"),
        DeploymentUnit::new("ForgeDAO")
            .verify(false)
            .arg(ArgSpec::address_of("ForgeREP")),
    ];

    let first = orchestrator(
        &network,
        explorer.clone(),
        FileReportStore::new(temp_dir.path()),
        config("sepolia"),
    )
    .run(&units, &Cancellation::new())
    .await
    .unwrap();

    assert_eq!(
        first.report.verification_results["ForgeREP"].status,
        VerificationStatus::Verified
    );
    assert_eq!(
        first.report.verification_results["ForgeDAO"].status,
        VerificationStatus::Skipped
    );

    let second = orchestrator(
        &network,
        explorer.clone(),
        FileReportStore::new(temp_dir.path()),
        config("sepolia"),
    )
    .run(&units, &Cancellation::new())
    .await
    .unwrap();

    assert_eq!(explorer.calls(), 1, "skipped units are not verified again");
    assert_eq!(
        second.outcome("ForgeREP").unwrap().verification,
        Some(first.report.verification_results["ForgeREP"].clone())
    );
}

#[tokio::test]
async fn test_concurrent_run_is_rejected() {
    let temp_dir = TempDir::new("deployctl-test").unwrap();
    let network = MockNetwork::new();
    let store = FileReportStore::new(temp_dir.path());
    let _lease = store.acquire_lease("localhost").unwrap();

    let err = orchestrator(
        &network,
        MockExplorer::accepting(),
        FileReportStore::new(temp_dir.path()),
        config("localhost"),
    )
    .run(&abc_units(), &Cancellation::new())
    .await
    .unwrap_err();

    assert!(matches!(err, DeployError::RunInProgress(ref network) if network == "localhost"));
    assert!(network.submissions().is_empty());
}

#[tokio::test]
async fn test_cancellation_keeps_recorded_units() {
    let temp_dir = TempDir::new("deployctl-test").unwrap();
    let network = MockNetwork::new();
    network.set_behavior("B", Behavior::Pending);
    let cancel = Cancellation::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let run = orchestrator(
        &network,
        MockExplorer::accepting(),
        FileReportStore::new(temp_dir.path()),
        deployctl_deploy::DeployConfig {
            confirmation_timeout_secs: 30,
            ..config("localhost")
        },
    )
    .run(&abc_units(), &cancel)
    .await
    .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.failure.as_ref().unwrap().error, DeployError::Cancelled.to_string());
    assert_eq!(run.outcome("C").unwrap().deployment, DeploymentOutcome::NotAttempted);

    let persisted = FileReportStore::new(temp_dir.path())
        .load("localhost")
        .unwrap()
        .unwrap();
    assert!(persisted.deployed("A").is_some());
    assert!(persisted.deployed("B").is_none());
}

#[tokio::test]
async fn test_cancelled_verification_is_retried_on_rerun() {
    let temp_dir = TempDir::new("deployctl-test").unwrap();
    let network = MockNetwork::new();
    // Deep enough to deploy, too shallow for the verification margin.
    network.set_confirmations(1);
    let explorer = MockExplorer::accepting();
    let units = vec![DeploymentUnit::new("A").bytecode(vec![0x60, 0x80])];
    let cancel = Cancellation::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let first = orchestrator(
        &network,
        explorer.clone(),
        FileReportStore::new(temp_dir.path()),
        deployctl_deploy::DeployConfig {
            verification_timeout_secs: 30,
            ..config("sepolia")
        },
    )
    .run(&units, &cancel)
    .await
    .unwrap();

    assert_eq!(first.status, RunStatus::Failed);
    let outcome = first.outcome("A").unwrap();
    assert_eq!(outcome.deployment, DeploymentOutcome::Deployed);
    let cancelled = outcome.verification.clone().unwrap();
    assert_eq!(cancelled.status, VerificationStatus::Failed);
    assert_eq!(cancelled.reason.as_deref(), Some("run cancelled"));

    let persisted = FileReportStore::new(temp_dir.path())
        .load("sepolia")
        .unwrap()
        .unwrap();
    assert!(persisted.deployed("A").is_some());
    assert_eq!(persisted.verification_results["A"], cancelled);
    assert_eq!(explorer.calls(), 0);

    network.set_confirmations(12);
    let second = orchestrator(
        &network,
        explorer.clone(),
        FileReportStore::new(temp_dir.path()),
        config("sepolia"),
    )
    .run(&units, &Cancellation::new())
    .await
    .unwrap();

    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(network.submissions(), vec!["A"]);
    let outcome = second.outcome("A").unwrap();
    assert_eq!(outcome.deployment, DeploymentOutcome::SkippedAlreadyDeployed);
    assert_eq!(
        outcome.verification.as_ref().unwrap().status,
        VerificationStatus::Verified
    );
    assert_eq!(explorer.calls(), 1);
    assert_eq!(
        second.report.verification_results["A"].status,
        VerificationStatus::Verified
    );
}

#[tokio::test]
async fn test_invalid_network_name_fails_before_any_network_call() {
    let temp_dir = TempDir::new("deployctl-test").unwrap();
    let network = MockNetwork::new();

    let err = orchestrator(
        &network,
        MockExplorer::accepting(),
        FileReportStore::new(temp_dir.path()),
        config("../sepolia"),
    )
    .run(&abc_units(), &Cancellation::new())
    .await
    .unwrap_err();

    assert!(matches!(err, DeployError::InvalidNetwork(_)));
    assert!(err.is_preflight());
    assert!(network.submissions().is_empty());
}

#[tokio::test]
async fn test_persistence_failure_is_fatal() {
    let temp_dir = TempDir::new("deployctl-test").unwrap();
    let network = MockNetwork::new();
    let store = FlakyStore::new(temp_dir.path());
    store.fail_saves();

    let run = orchestrator(
        &network,
        MockExplorer::accepting(),
        store,
        config("localhost"),
    )
    .run(&abc_units(), &Cancellation::new())
    .await
    .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(network.submissions(), vec!["A"]);
    // The address is still handed back to the caller.
    assert!(run.report.deployed("A").is_some());
    assert_eq!(run.outcome("B").unwrap().deployment, DeploymentOutcome::NotAttempted);
    assert!(run.failure.unwrap().error.contains("persist"));
}

#[tokio::test]
async fn test_redeploy_ignores_prior_report() {
    let temp_dir = TempDir::new("deployctl-test").unwrap();
    let network = MockNetwork::new();
    let units = abc_units();

    let first = orchestrator(
        &network,
        MockExplorer::accepting(),
        FileReportStore::new(temp_dir.path()),
        config("localhost"),
    )
    .run(&units, &Cancellation::new())
    .await
    .unwrap();

    let second = orchestrator(
        &network,
        MockExplorer::accepting(),
        FileReportStore::new(temp_dir.path()),
        config("localhost"),
    )
    .redeploy(true)
    .run(&units, &Cancellation::new())
    .await
    .unwrap();

    assert_eq!(network.submissions().len(), 6);
    assert_ne!(
        first.report.address_of("A"),
        second.report.address_of("A"),
        "every unit gets a fresh deployment"
    );
}
