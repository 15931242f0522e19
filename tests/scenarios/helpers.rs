//! Test utility functions for batchflow scenarios

#![allow(dead_code)]

use async_trait::async_trait;
use batchflow::backend::{BackendError, ClusterScheduler, CommandRunner, ProcessOutput};
use batchflow::core::config::{PipelineConfig, Settings};
use batchflow::core::{CommandSpec, ExecutionStatus, RunReport, StageReport, StageStatus};
use batchflow::dispatch::{PipelineCoordinator, PipelineEvent, RunOptions, WaitPolicy};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const PROJECT: &str = "proj";
pub const DATA_TAG: &str = "Fall2018_RGA_inbending";
pub const MC_TAG: &str = "MC_RGA_inbending";
pub const SOURCE_NAME: &str = "skim.root";

/// A throwaway `out/<project>` tree
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("out").join(PROJECT)).unwrap();
        Self { dir }
    }

    /// 3 configurations x 2 pairs x 2 tags, each leaf with its filtered artifact
    pub fn standard() -> Self {
        let fixture = Self::new();
        for config in ["loose", "nominal", "tight"] {
            fixture.add_primary_config(config);
            for pair in ["piplus_pi0", "piplus_piminus"] {
                for tag in [DATA_TAG, MC_TAG] {
                    fixture.add_leaf(config, pair, tag);
                    fixture.add_artifact(config, pair, tag);
                }
            }
        }
        fixture
    }

    pub fn workdir(&self) -> &Path {
        self.dir.path()
    }

    pub fn settings(&self) -> Settings {
        Settings {
            output_base: self.dir.path().join("out"),
            ..Settings::default()
        }
    }

    pub fn project_root(&self) -> PathBuf {
        self.dir.path().join("out").join(PROJECT)
    }

    pub fn config_dir(&self, config: &str) -> PathBuf {
        self.project_root().join(format!("config_{}", config))
    }

    pub fn leaf(&self, config: &str, pair: &str, tag: &str) -> PathBuf {
        self.config_dir(config).join(pair).join(tag)
    }

    pub fn add_leaf(&self, config: &str, pair: &str, tag: &str) -> PathBuf {
        let manifest = format!("tfile: /data/{}/{}\nttree: events\n", tag, SOURCE_NAME);
        self.write_manifest(config, pair, tag, &manifest)
    }

    pub fn write_manifest(&self, config: &str, pair: &str, tag: &str, content: &str) -> PathBuf {
        let leaf = self.leaf(config, pair, tag);
        std::fs::create_dir_all(&leaf).unwrap();
        let manifest = leaf.join("tree_info.yaml");
        std::fs::write(&manifest, content).unwrap();
        manifest
    }

    pub fn add_artifact(&self, config: &str, pair: &str, tag: &str) {
        std::fs::write(self.leaf(config, pair, tag).join(SOURCE_NAME), b"filtered").unwrap();
    }

    pub fn add_primary_config(&self, config: &str) {
        let dir = self.config_dir(config);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{}.yaml", config)), "cuts: {}\n").unwrap();
    }

    pub fn write_file(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }
}

/// Records every command and fails those mentioning a marker
#[derive(Default)]
pub struct MockRunner {
    commands: Mutex<Vec<CommandSpec>>,
    fail_marker: Option<String>,
    captured_stdout: String,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit 1 for any command with an argument containing `marker`
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Self::default()
        }
    }

    /// Stdout returned by captured (external stage) commands
    pub fn with_stdout(mut self, stdout: &str) -> Self {
        self.captured_stdout = stdout.to_string();
        self
    }

    pub fn commands(&self) -> Vec<CommandSpec> {
        self.commands.lock().unwrap().clone()
    }

    /// The rendered macro call of every recorded compute command
    pub fn macro_calls(&self) -> Vec<String> {
        self.commands()
            .iter()
            .filter_map(|c| c.args.last().cloned())
            .collect()
    }

    fn exit_code(&self, command: &CommandSpec) -> i32 {
        match &self.fail_marker {
            Some(marker) if command.args.iter().any(|a| a.contains(marker.as_str())) => 1,
            _ => 0,
        }
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, command: &CommandSpec, _workdir: &Path) -> Result<ProcessOutput, BackendError> {
        self.commands.lock().unwrap().push(command.clone());
        Ok(ProcessOutput {
            code: Some(self.exit_code(command)),
            ..Default::default()
        })
    }

    async fn capture(&self, command: &CommandSpec, _workdir: &Path) -> Result<ProcessOutput, BackendError> {
        self.commands.lock().unwrap().push(command.clone());
        Ok(ProcessOutput {
            code: Some(self.exit_code(command)),
            stdout: self.captured_stdout.clone(),
            stderr: String::new(),
        })
    }
}

/// Scripted submission replies and queue listings
pub struct MockScheduler {
    replies: Mutex<VecDeque<String>>,
    next_id: AtomicUsize,
    scripts: Mutex<Vec<PathBuf>>,
    listings: Mutex<VecDeque<Option<Vec<String>>>>,
    queries: AtomicUsize,
}

impl MockScheduler {
    /// Unscripted submissions get ids 5000, 5001, ...
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            next_id: AtomicUsize::new(5000),
            scripts: Mutex::new(Vec::new()),
            listings: Mutex::new(VecDeque::new()),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn with_replies(self, replies: &[&str]) -> Self {
        *self.replies.lock().unwrap() = replies.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Queue listings in order; `None` is a failed query. The last one repeats.
    pub fn with_listings(self, listings: Vec<Option<Vec<&str>>>) -> Self {
        *self.listings.lock().unwrap() = listings
            .into_iter()
            .map(|l| l.map(|ids| ids.into_iter().map(str::to_string).collect()))
            .collect();
        self
    }

    pub fn scripts(&self) -> Vec<PathBuf> {
        self.scripts.lock().unwrap().clone()
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterScheduler for MockScheduler {
    async fn submit(&self, script: &Path) -> Result<String, BackendError> {
        self.scripts.lock().unwrap().push(script.to_path_buf());
        let scripted = self.replies.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| {
            format!(
                "Submitted batch job {}\n",
                self.next_id.fetch_add(1, Ordering::SeqCst)
            )
        }))
    }

    async fn active_jobs(&self) -> Result<HashSet<String>, BackendError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut listings = self.listings.lock().unwrap();
        let next = if listings.len() > 1 {
            listings.pop_front().flatten()
        } else {
            listings.front().cloned().flatten()
        };
        match next {
            Some(ids) => Ok(ids.into_iter().collect()),
            None => Err(BackendError::Output {
                program: "squeue".to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

pub fn fast_wait_policy() -> WaitPolicy {
    WaitPolicy {
        poll_interval: Duration::from_millis(1),
        max_wait: Duration::from_secs(5),
        max_query_failures: 3,
    }
}

pub fn coordinator(
    fixture: &Fixture,
    runner: &Arc<MockRunner>,
    scheduler: &Arc<MockScheduler>,
    options: RunOptions,
) -> PipelineCoordinator {
    PipelineCoordinator::new(PROJECT, fixture.settings(), runner.clone(), scheduler.clone())
        .with_options(options)
        .with_wait_policy(fast_wait_policy())
        .with_workdir(fixture.workdir())
}

/// Collect every event the coordinator publishes
pub fn record_events(coordinator: &mut PipelineCoordinator) -> Arc<Mutex<Vec<PipelineEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    coordinator.add_event_handler(move |event| sink.lock().unwrap().push(event));
    events
}

pub fn pipeline(yaml: &str) -> PipelineConfig {
    PipelineConfig::from_yaml(yaml).unwrap()
}

pub fn local() -> RunOptions {
    RunOptions::default()
}

pub fn cluster() -> RunOptions {
    RunOptions {
        mode: batchflow::DispatchMode::Cluster,
        ..RunOptions::default()
    }
}

pub fn stage<'a>(report: &'a RunReport, key: &str) -> &'a StageReport {
    report
        .stage(key)
        .unwrap_or_else(|| panic!("stage '{}' missing from report", key))
}

pub fn assert_run_completed(report: &RunReport) {
    assert_eq!(
        report.status,
        ExecutionStatus::Completed,
        "expected completed run, got {:?}",
        report.status
    );
    assert!(report.aborted_at().is_none());
}

pub fn assert_stage_status(report: &RunReport, key: &str, status: StageStatus) {
    assert_eq!(stage(report, key).status, status, "status of stage '{}'", key);
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| panic!("{}: {}", path.display(), e))
}
