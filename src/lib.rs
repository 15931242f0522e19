//! batchflow - staged batch-pipeline orchestrator for work-unit trees

pub mod backend;
pub mod cli;
pub mod core;
pub mod dispatch;
pub mod stage;

// Re-export commonly used types
pub use backend::{ClusterScheduler, CommandRunner, SlurmScheduler, SubprocessRunner};
pub use core::{DependencySet, DispatchMode, Job, OrchestratorError, RunReport, StageContext, WorkUnit};
pub use dispatch::{JobDispatcher, PipelineCoordinator, PipelineEvent, RunOptions};
pub use stage::{create_stage, Stage, StageOptions};
