//! Execution state models

use crate::core::{dependency::DependencySet, job::DispatchMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Run has not started
    Pending,
    /// Run is in progress
    Running,
    /// Every stage was visited
    Completed,
    /// Run was aborted (fail-fast or structural error)
    Failed,
}

/// Coordinator progress over the ordered stage list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinatorState {
    NotStarted,
    Running { stage_index: usize },
    Completed,
}

/// What happened to a stage as a whole
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    /// Every eligible unit was visited
    Completed,
    /// Stage name not in the registry
    Unknown,
    /// Stage was not run at all
    Skipped { reason: String },
    /// Run aborted inside this stage at the named unit
    Aborted { tag: String },
}

/// Counters and job ids for one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub mode: DispatchMode,
    pub status: StageStatus,

    /// Precondition passed to this stage's submissions
    pub precondition: Option<String>,

    /// Units the stage selection predicate rejected
    pub filtered: usize,

    /// Units skipped by pre-dispatch checks
    pub skipped: usize,

    pub succeeded: usize,
    pub failed: usize,
    pub submitted: usize,

    /// Job ids from this stage's submissions
    pub dependencies: DependencySet,
}

impl StageReport {
    pub fn new(stage: impl Into<String>, mode: DispatchMode) -> Self {
        let stage = stage.into();
        Self {
            dependencies: DependencySet::new(stage.clone()),
            stage,
            mode,
            status: StageStatus::Completed,
            precondition: None,
            filtered: 0,
            skipped: 0,
            succeeded: 0,
            failed: 0,
            submitted: 0,
        }
    }

    pub fn with_status(mut self, status: StageStatus) -> Self {
        self.status = status;
        self
    }

    /// Jobs dispatched (any outcome)
    pub fn dispatched(&self) -> usize {
        self.succeeded + self.failed + self.submitted
    }
}

/// Summary of a whole coordinator run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub project: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageReport>,
}

impl RunReport {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            project: project.into(),
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            stages: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Utc::now();
    }

    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self) {
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    pub fn stage(&self, key: &str) -> Option<&StageReport> {
        self.stages.iter().rev().find(|s| s.stage == key)
    }

    pub fn total_failed(&self) -> usize {
        self.stages.iter().map(|s| s.failed).sum()
    }

    pub fn total_dispatched(&self) -> usize {
        self.stages.iter().map(StageReport::dispatched).sum()
    }

    /// Every cluster job id submitted during the run, in submission order
    pub fn cluster_jobs(&self) -> DependencySet {
        let ids = self.stages.iter().flat_map(|s| s.dependencies.ids().iter().cloned());
        DependencySet::from_ids(self.project.clone(), ids)
    }

    /// The stage and unit that aborted the run, if any
    pub fn aborted_at(&self) -> Option<(&str, &str)> {
        self.stages.iter().find_map(|s| match &s.status {
            StageStatus::Aborted { tag } => Some((s.stage.as_str(), tag.as_str())),
            _ => None,
        })
    }
}
