//! Job domain model: commands, resource profiles and dispatch state

use crate::core::{context::StageContext, shell::quote_args};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A fully resolved external invocation. Executed directly, never via a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Shell-quoted rendering, for batch scripts and log lines
    pub fn to_shell(&self) -> String {
        quote_args(&self.argv())
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell())
    }
}

/// Cluster resources requested for a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProfile {
    /// Wall time as `HH:MM:SS`
    pub walltime: String,

    /// Memory per CPU in MB
    pub memory_per_cpu: u32,

    pub cpu_count: u32,
}

impl ResourceProfile {
    pub fn new(walltime: impl Into<String>, memory_per_cpu: u32, cpu_count: u32) -> Self {
        Self {
            walltime: walltime.into(),
            memory_per_cpu,
            cpu_count,
        }
    }
}

impl Default for ResourceProfile {
    fn default() -> Self {
        Self::new("24:00:00", 1000, 1)
    }
}

/// Where a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Blocking subprocess on this host
    Local,
    /// Batch script submitted to the cluster scheduler
    Cluster,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Local => f.write_str("local"),
            DispatchMode::Cluster => f.write_str("cluster"),
        }
    }
}

/// Everything the dispatcher needs to run one job
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub stage_key: String,

    /// Human label; names the script and log files
    pub label: String,

    pub job_name: String,
    pub output_dir: PathBuf,
    pub commands: Vec<CommandSpec>,
    pub profile: ResourceProfile,

    /// `afterok:...` string for cluster submissions
    pub precondition: Option<String>,
}

impl JobRequest {
    /// A request for the context's unit, writing into the context's output directory
    pub fn for_context(ctx: &StageContext, commands: Vec<CommandSpec>) -> Self {
        Self {
            stage_key: ctx.stage_key().to_string(),
            label: ctx.unit().tag.clone(),
            job_name: format!("{}_{}", ctx.stage_key(), ctx.unit().tag),
            output_dir: ctx.output_dir().to_path_buf(),
            commands,
            profile: ResourceProfile::default(),
            precondition: ctx.precondition().map(str::to_string),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_job_name(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = job_name.into();
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_profile(mut self, profile: ResourceProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn script_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("run_{}_{}.script", self.stage_key, self.label))
    }

    pub fn stdout_log(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.out", self.stage_key, self.label))
    }

    pub fn stderr_log(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.err", self.stage_key, self.label))
    }
}

/// Lifecycle of a dispatched job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobState {
    /// Built but not yet handed to the dispatcher
    Pending,
    /// Local subprocess is running
    Running { started_at: DateTime<Utc> },
    /// Local subprocess exited zero
    Succeeded {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Local failure, or a submission whose job id could not be obtained
    Failed {
        error: String,
        failed_at: DateTime<Utc>,
    },
    /// Batch script written, not yet submitted
    ScriptWritten { script: PathBuf },
    /// Accepted by the cluster scheduler
    Submitted {
        job_id: String,
        script: PathBuf,
        submitted_at: DateTime<Utc>,
    },
}

impl JobState {
    /// Terminal from this process's point of view
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded { .. } | JobState::Failed { .. } | JobState::Submitted { .. }
        )
    }
}

/// One dispatched unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub stage_key: String,
    pub tag: String,
    pub output_dir: PathBuf,
    pub commands: Vec<CommandSpec>,
    pub mode: DispatchMode,
    pub state: JobState,
}

impl Job {
    pub fn new(request: &JobRequest, mode: DispatchMode) -> Self {
        Self {
            stage_key: request.stage_key.clone(),
            tag: request.label.clone(),
            output_dir: request.output_dir.clone(),
            commands: request.commands.clone(),
            mode,
            state: JobState::Pending,
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match &self.state {
            JobState::Submitted { job_id, .. } => Some(job_id),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, JobState::Failed { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub(crate) fn start(&mut self) {
        self.state = JobState::Running {
            started_at: Utc::now(),
        };
    }

    pub(crate) fn succeed(&mut self) {
        let started_at = match &self.state {
            JobState::Running { started_at } => *started_at,
            _ => Utc::now(),
        };
        self.state = JobState::Succeeded {
            started_at,
            completed_at: Utc::now(),
        };
    }

    pub(crate) fn fail(&mut self, error: impl Into<String>) {
        self.state = JobState::Failed {
            error: error.into(),
            failed_at: Utc::now(),
        };
    }

    pub(crate) fn script_written(&mut self, script: PathBuf) {
        self.state = JobState::ScriptWritten { script };
    }

    pub(crate) fn submitted(&mut self, job_id: String) {
        let script = match &self.state {
            JobState::ScriptWritten { script } => script.clone(),
            _ => PathBuf::new(),
        };
        self.state = JobState::Submitted {
            job_id,
            script,
            submitted_at: Utc::now(),
        };
    }
}
