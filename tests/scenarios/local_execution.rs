//! Test: local dispatch, failures and fail-fast

use crate::helpers::*;
use batchflow::core::{ExecutionStatus, StageStatus};
use batchflow::dispatch::{PipelineEvent, RunOptions};
use std::sync::Arc;

#[tokio::test]
async fn test_failed_units_do_not_stop_the_stage() {
    let fixture = Fixture::standard();
    let runner = Arc::new(MockRunner::failing_on(DATA_TAG));
    let scheduler = Arc::new(MockScheduler::new());
    let mut coord = coordinator(&fixture, &runner, &scheduler, local());

    let report = coord
        .run(&pipeline("stages: [kinematicBins, particleMisidentification]\n"))
        .await
        .unwrap();

    assert_run_completed(&report);
    let bins = stage(&report, "kinematicBins");
    assert_eq!(bins.status, StageStatus::Completed);
    assert_eq!(bins.failed, 6);
    assert_eq!(bins.succeeded, 6);
    assert_eq!(stage(&report, "particleMisidentification").succeeded, 6);
    assert_eq!(report.total_failed(), 6);
    assert_eq!(runner.commands().len(), 18);
}

#[tokio::test]
async fn test_fail_fast_stops_at_first_failure() {
    let fixture = Fixture::standard();
    let runner = Arc::new(MockRunner::failing_on(DATA_TAG));
    let scheduler = Arc::new(MockScheduler::new());
    let options = RunOptions {
        fail_fast: true,
        ..local()
    };
    let mut coord = coordinator(&fixture, &runner, &scheduler, options);

    let report = coord
        .run(&pipeline("stages: [kinematicBins, particleMisidentification]\n"))
        .await
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::Failed);
    assert_eq!(report.aborted_at(), Some(("kinematicBins", DATA_TAG)));
    assert!(report.stage("particleMisidentification").is_none());
    assert_eq!(runner.commands().len(), 1);
}

#[tokio::test]
async fn test_fail_fast_ignores_successful_units() {
    let fixture = Fixture::standard();
    let runner = Arc::new(MockRunner::failing_on("no-such-marker"));
    let scheduler = Arc::new(MockScheduler::new());
    let options = RunOptions {
        fail_fast: true,
        ..local()
    };
    let mut coord = coordinator(&fixture, &runner, &scheduler, options);

    let report = coord.run(&pipeline("stages: [kinematicBins]\n")).await.unwrap();

    assert_run_completed(&report);
    assert_eq!(stage(&report, "kinematicBins").succeeded, 12);
}

#[tokio::test]
async fn test_local_jobs_create_output_directories() {
    let fixture = Fixture::standard();
    let runner = Arc::new(MockRunner::new());
    let scheduler = Arc::new(MockScheduler::new());
    let mut coord = coordinator(&fixture, &runner, &scheduler, local());
    let events = record_events(&mut coord);

    coord.run(&pipeline("stages: [asymmetry]\n")).await.unwrap();

    assert!(fixture
        .leaf("tight", "piplus_piminus", MC_TAG)
        .join("stage-out___asymmetry")
        .is_dir());
    assert!(scheduler.scripts().is_empty());

    let finished = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, PipelineEvent::JobFinished { .. }))
        .count();
    assert_eq!(finished, 12);
}

#[tokio::test]
async fn test_compute_invocation_shape() {
    let fixture = Fixture::new();
    fixture.add_primary_config("nominal");
    fixture.add_leaf("nominal", "piplus_pi0", MC_TAG);
    fixture.add_artifact("nominal", "piplus_pi0", MC_TAG);

    let runner = Arc::new(MockRunner::new());
    let scheduler = Arc::new(MockScheduler::new());
    let mut coord = coordinator(&fixture, &runner, &scheduler, local());
    coord
        .run(&pipeline("stages: [particleMisidentification]\n"))
        .await
        .unwrap();

    let commands = runner.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].program, "root");
    assert_eq!(&commands[0].args[..3], &["-l", "-b", "-q"]);

    let call = &commands[0].args[3];
    assert!(call.starts_with("src/modules/particleMisidentification.C(\""));
    assert!(call.contains("\"events\""));
    assert!(call.ends_with("particleMisidentification.yaml\")"));
}
