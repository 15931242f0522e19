//! Test: job ids threaded from one stage into the next stage's submissions

use crate::helpers::*;
use batchflow::core::StageStatus;
use batchflow::dispatch::{PipelineEvent, RunOptions};
use std::sync::Arc;

fn single_leaf() -> Fixture {
    let fixture = Fixture::new();
    fixture.add_primary_config("nominal");
    fixture.add_leaf("nominal", "piplus_pi0", DATA_TAG);
    fixture.add_artifact("nominal", "piplus_pi0", DATA_TAG);
    fixture
}

fn script_of(fixture: &Fixture, stage_key: &str) -> String {
    read(
        &fixture
            .leaf("nominal", "piplus_pi0", DATA_TAG)
            .join(format!("stage-out___{}", stage_key))
            .join(format!("run_{}_{}.script", stage_key, DATA_TAG)),
    )
}

#[tokio::test]
async fn test_submission_id_becomes_next_precondition() {
    let fixture = single_leaf();
    let runner = Arc::new(MockRunner::new());
    let scheduler = Arc::new(MockScheduler::new().with_replies(&["Submitted batch job 4821\n"]));
    let mut coord = coordinator(&fixture, &runner, &scheduler, cluster());

    let report = coord
        .run(&pipeline("stages: [kinematicBins, asymmetry]\n"))
        .await
        .unwrap();

    assert_run_completed(&report);
    assert_eq!(
        coord.dependencies("kinematicBins").unwrap().ids(),
        &["4821".to_string()]
    );
    assert_eq!(
        stage(&report, "asymmetry").precondition.as_deref(),
        Some("afterok:4821")
    );

    let upstream = script_of(&fixture, "kinematicBins");
    assert!(upstream.starts_with("#!/bin/bash\n"));
    assert!(!upstream.contains("--dependency"));

    let downstream = script_of(&fixture, "asymmetry");
    assert!(downstream.contains("#SBATCH --dependency=afterok:4821\n"));
    assert!(downstream.contains("#SBATCH --mem-per-cpu=4000\n"));
    assert!(runner.commands().is_empty());
    assert_eq!(scheduler.queries(), 0);
}

#[tokio::test]
async fn test_ids_recorded_once_in_submission_order() {
    let fixture = Fixture::standard();
    let runner = Arc::new(MockRunner::new());
    let scheduler = Arc::new(MockScheduler::new());
    let mut coord = coordinator(&fixture, &runner, &scheduler, cluster());

    let report = coord
        .run(&pipeline("stages: [particleMisidentification]\n"))
        .await
        .unwrap();

    let stage_report = stage(&report, "particleMisidentification");
    assert_eq!(stage_report.submitted, 6);
    let expected: Vec<String> = (5000..5006).map(|id| id.to_string()).collect();
    assert_eq!(stage_report.dependencies.ids(), expected.as_slice());
    assert_eq!(
        stage_report.dependencies.report_line(),
        "[CLUSTER_JOBS] 5000,5001,5002,5003,5004,5005"
    );
    assert_eq!(scheduler.scripts().len(), 6);
}

#[tokio::test]
async fn test_duplicate_ids_are_kept_once() {
    let fixture = Fixture::new();
    fixture.add_primary_config("nominal");
    for tag in [DATA_TAG, MC_TAG] {
        fixture.add_leaf("nominal", "piplus_pi0", tag);
        fixture.add_artifact("nominal", "piplus_pi0", tag);
    }
    let runner = Arc::new(MockRunner::new());
    let scheduler = Arc::new(
        MockScheduler::new()
            .with_replies(&["Submitted batch job 42\n", "Submitted batch job 42\n"]),
    );
    let mut coord = coordinator(&fixture, &runner, &scheduler, cluster());

    let report = coord.run(&pipeline("stages: [kinematicBins]\n")).await.unwrap();

    let stage_report = stage(&report, "kinematicBins");
    assert_eq!(stage_report.submitted, 2);
    assert_eq!(stage_report.dependencies.ids(), &["42".to_string()]);
}

#[tokio::test]
async fn test_unrecognised_reply_contributes_no_id() {
    let fixture = single_leaf();
    let runner = Arc::new(MockRunner::new());
    let scheduler = Arc::new(
        MockScheduler::new().with_replies(&["sbatch: error: invalid partition specified\n"]),
    );
    let mut coord = coordinator(&fixture, &runner, &scheduler, cluster());

    let report = coord
        .run(&pipeline("stages: [kinematicBins, asymmetry]\n"))
        .await
        .unwrap();

    assert_run_completed(&report);
    let upstream = stage(&report, "kinematicBins");
    assert_eq!(upstream.failed, 1);
    assert!(upstream.dependencies.is_empty());

    let downstream = stage(&report, "asymmetry");
    assert_eq!(downstream.precondition, None);
    assert_eq!(downstream.submitted, 1);
    assert!(!script_of(&fixture, "asymmetry").contains("--dependency"));
}

#[tokio::test]
async fn test_rerun_overwrites_script() {
    let fixture = single_leaf();
    let stale = fixture
        .leaf("nominal", "piplus_pi0", DATA_TAG)
        .join("stage-out___kinematicBins");
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(
        stale.join(format!("run_kinematicBins_{}.script", DATA_TAG)),
        "echo stale\n",
    )
    .unwrap();

    let runner = Arc::new(MockRunner::new());
    let scheduler = Arc::new(MockScheduler::new());
    let mut coord = coordinator(&fixture, &runner, &scheduler, cluster());
    coord.run(&pipeline("stages: [kinematicBins]\n")).await.unwrap();

    let script = script_of(&fixture, "kinematicBins");
    assert!(script.starts_with("#!/bin/bash\n"));
    assert!(!script.contains("stale"));
}

#[tokio::test]
async fn test_explicit_after_merges_upstreams() {
    let fixture = single_leaf();
    let runner = Arc::new(MockRunner::new());
    let scheduler = Arc::new(MockScheduler::new().with_replies(&[
        "Submitted batch job 11\n",
        "Submitted batch job 12\n",
    ]));
    let mut coord = coordinator(&fixture, &runner, &scheduler, cluster());

    let yaml = r#"
stages:
  - kinematicBins
  - name: purityBinning
    after: []
  - name: asymmetry
    after: [kinematicBins, purityBinning]
"#;
    let report = coord.run(&pipeline(yaml)).await.unwrap();

    assert_eq!(stage(&report, "purityBinning").precondition, None);
    assert_eq!(
        stage(&report, "asymmetry").precondition.as_deref(),
        Some("afterok:11:12")
    );
}

#[tokio::test]
async fn test_wait_blocks_until_upstream_leaves_queue() {
    let fixture = single_leaf();
    let runner = Arc::new(MockRunner::new());
    let scheduler = Arc::new(
        MockScheduler::new()
            .with_replies(&["Submitted batch job 4821\n"])
            .with_listings(vec![Some(vec!["4821", "99"]), Some(vec!["99"])]),
    );
    let options = RunOptions {
        wait: true,
        ..cluster()
    };
    let mut coord = coordinator(&fixture, &runner, &scheduler, options);
    let events = record_events(&mut coord);

    let report = coord
        .run(&pipeline("stages: [kinematicBins, asymmetry]\n"))
        .await
        .unwrap();

    assert_run_completed(&report);
    assert_eq!(scheduler.queries(), 2);
    assert_eq!(stage(&report, "asymmetry").submitted, 1);
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        PipelineEvent::WaitingForJobs { stage, remaining: 1 } if stage == "asymmetry"
    )));
}

#[tokio::test]
async fn test_local_stage_waits_for_cluster_upstream() {
    let fixture = single_leaf();
    let runner = Arc::new(MockRunner::new());
    let scheduler = Arc::new(
        MockScheduler::new()
            .with_replies(&["Submitted batch job 4821\n"])
            .with_listings(vec![Some(vec![])]),
    );
    let mut coord = coordinator(&fixture, &runner, &scheduler, local());

    let yaml = r#"
stages:
  - name: kinematicBins
    mode: cluster
  - asymmetry
"#;
    let report = coord.run(&pipeline(yaml)).await.unwrap();

    assert_eq!(scheduler.queries(), 1);
    let downstream = stage(&report, "asymmetry");
    assert_eq!(downstream.precondition, None);
    assert_eq!(downstream.succeeded, 1);
    assert_eq!(runner.commands().len(), 1);
}

#[tokio::test]
async fn test_unreachable_scheduler_skips_dependent_stage() {
    let fixture = single_leaf();
    let runner = Arc::new(MockRunner::new());
    let scheduler = Arc::new(
        MockScheduler::new()
            .with_replies(&["Submitted batch job 4821\n"])
            .with_listings(vec![None]),
    );
    let options = RunOptions {
        wait: true,
        ..cluster()
    };
    let mut coord = coordinator(&fixture, &runner, &scheduler, options);

    let report = coord
        .run(&pipeline("stages: [kinematicBins, asymmetry, purityBinning]\n"))
        .await
        .unwrap();

    assert_run_completed(&report);
    assert!(matches!(
        &stage(&report, "asymmetry").status,
        StageStatus::Skipped { reason } if reason.contains("3 times")
    ));
    assert_eq!(scheduler.queries(), 3);
    assert_eq!(stage(&report, "purityBinning").precondition, None);
    assert_eq!(stage(&report, "purityBinning").submitted, 1);
}

#[tokio::test]
async fn test_external_stage_report_line_feeds_precondition() {
    let fixture = single_leaf();
    let runner = Arc::new(
        MockRunner::new().with_stdout("queued two jobs\n[CLUSTER_JOBS] 77,78\n"),
    );
    let scheduler = Arc::new(MockScheduler::new());
    let mut coord = coordinator(&fixture, &runner, &scheduler, cluster());

    let yaml = r#"
stages:
  - name: toyGeneration
    command: ["ruby", "scripts/generate.rb"]
  - asymmetry
"#;
    let report = coord.run(&pipeline(yaml)).await.unwrap();

    let external = stage(&report, "toyGeneration");
    assert_eq!(external.submitted, 2);
    assert_eq!(
        external.dependencies.ids(),
        &["77".to_string(), "78".to_string()]
    );
    assert_eq!(
        stage(&report, "asymmetry").precondition.as_deref(),
        Some("afterok:77:78")
    );

    let commands = runner.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].program, "ruby");
    assert_eq!(commands[0].args, vec!["scripts/generate.rb", "--cluster"]);
}
