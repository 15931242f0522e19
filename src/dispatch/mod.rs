//! Dispatch layer - job execution, blocking waits and stage sequencing

pub mod coordinator;
pub mod dispatcher;
pub mod script;
pub mod wait;

pub use coordinator::{EventHandler, PipelineCoordinator, PipelineEvent, RunOptions};
pub use dispatcher::JobDispatcher;
pub use script::{extract_job_id, BatchScript};
pub use wait::{wait_for_jobs, WaitError, WaitPolicy};
