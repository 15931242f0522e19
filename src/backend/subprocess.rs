//! Local subprocess runner

use crate::backend::{BackendError, CommandRunner, ProcessOutput};
use crate::core::CommandSpec;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Executes command vectors directly, without a shell and without a timeout
#[derive(Debug, Clone, Default)]
pub struct SubprocessRunner;

impl SubprocessRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(spec: &CommandSpec, workdir: &Path) -> Command {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args).current_dir(workdir);
        command
    }

    fn spawn_error(spec: &CommandSpec, e: std::io::Error) -> BackendError {
        BackendError::Spawn {
            program: spec.program.clone(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl CommandRunner for SubprocessRunner {
    async fn run(&self, command: &CommandSpec, workdir: &Path) -> Result<ProcessOutput, BackendError> {
        debug!("spawning {}", command);

        let status = Self::command(command, workdir)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| Self::spawn_error(command, e))?;

        Ok(ProcessOutput {
            code: status.code(),
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    async fn capture(&self, command: &CommandSpec, workdir: &Path) -> Result<ProcessOutput, BackendError> {
        debug!("spawning {} (captured)", command);

        let output = Self::command(command, workdir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Self::spawn_error(command, e))?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
