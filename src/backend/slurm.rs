//! Slurm scheduler client (`sbatch` / `squeue`)

use crate::backend::{BackendError, ClusterScheduler};
use crate::core::config::SchedulerSettings;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, warn};

/// Talks to Slurm through its command-line tools
#[derive(Debug, Clone)]
pub struct SlurmScheduler {
    submit_program: String,
    queue_program: String,
    queue_args: Vec<String>,
}

impl SlurmScheduler {
    pub fn new(settings: &SchedulerSettings) -> Self {
        Self {
            submit_program: settings.submit_program.clone(),
            queue_program: settings.queue_program.clone(),
            queue_args: settings.queue_args.clone(),
        }
    }

    /// Restrict queue listings to the current user when `$USER` is known
    fn queue_command(&self) -> Command {
        let mut command = Command::new(&self.queue_program);
        command.args(&self.queue_args);
        if let Ok(user) = std::env::var("USER") {
            if !user.is_empty() {
                command.args(["--user", &user]);
            }
        }
        command
    }
}

impl Default for SlurmScheduler {
    fn default() -> Self {
        Self::new(&SchedulerSettings::default())
    }
}

#[async_trait]
impl ClusterScheduler for SlurmScheduler {
    async fn submit(&self, script: &Path) -> Result<String, BackendError> {
        debug!("{} {}", self.submit_program, script.display());

        let output = Command::new(&self.submit_program)
            .arg(script)
            .output()
            .await
            .map_err(|e| BackendError::Spawn {
                program: self.submit_program.clone(),
                message: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                "{} exited with {:?}: {}",
                self.submit_program,
                output.status.code(),
                stderr.trim()
            );
            return Err(BackendError::Exit {
                program: self.submit_program.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(stdout)
    }

    async fn active_jobs(&self) -> Result<HashSet<String>, BackendError> {
        let output = self
            .queue_command()
            .output()
            .await
            .map_err(|e| BackendError::Spawn {
                program: self.queue_program.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(BackendError::Exit {
                program: self.queue_program.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_queue_listing(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// One job id per line; array tasks (`1234_7`) collapse to their parent id
pub fn parse_queue_listing(listing: &str) -> HashSet<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.split(['_', '.', ' ']).next())
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}
