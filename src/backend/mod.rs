//! Execution backends: local subprocesses and the cluster scheduler CLI

pub mod slurm;
pub mod subprocess;

use crate::core::CommandSpec;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

pub use slurm::SlurmScheduler;
pub use subprocess::SubprocessRunner;

/// Error types for backend operations
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to spawn '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error("'{program}' exited with code {code}: {stderr}")]
    Exit {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("unexpected output from '{program}': {message}")]
    Output { program: String, message: String },
}

/// Result of a finished subprocess
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when terminated by a signal
    pub code: Option<i32>,

    /// Captured stdout (empty when stdio was inherited)
    pub stdout: String,

    /// Captured stderr (empty when stdio was inherited)
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn describe_exit(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs command vectors on the local host
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion with inherited stdio
    async fn run(&self, command: &CommandSpec, workdir: &Path) -> Result<ProcessOutput, BackendError>;

    /// Run to completion capturing stdout and stderr
    async fn capture(&self, command: &CommandSpec, workdir: &Path) -> Result<ProcessOutput, BackendError>;
}

/// Black-box access to the cluster scheduler
#[async_trait]
pub trait ClusterScheduler: Send + Sync {
    /// Submit a batch script, returning the scheduler's raw stdout
    async fn submit(&self, script: &Path) -> Result<String, BackendError>;

    /// Ids of every job the scheduler still considers active
    async fn active_jobs(&self) -> Result<HashSet<String>, BackendError>;
}
