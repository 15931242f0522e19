//! Job dispatcher: local subprocess or cluster submission

use crate::backend::{ClusterScheduler, CommandRunner};
use crate::core::{
    DependencySet, DispatchMode, Job, JobRequest, SkipReason, StageContext, WorkUnit,
};
use crate::dispatch::script::{extract_job_id, BatchScript};
use crate::stage::Stage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs job requests in one mode.
///
/// Holds no per-call state; the only thing a dispatch leaves behind apart
/// from files is the job id appended to the caller's [`DependencySet`].
#[derive(Clone)]
pub struct JobDispatcher {
    mode: DispatchMode,
    runner: Arc<dyn CommandRunner>,
    scheduler: Arc<dyn ClusterScheduler>,
    workdir: PathBuf,
    project_root: PathBuf,
}

impl JobDispatcher {
    pub fn new(
        mode: DispatchMode,
        runner: Arc<dyn CommandRunner>,
        scheduler: Arc<dyn ClusterScheduler>,
        workdir: impl Into<PathBuf>,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            mode,
            runner,
            scheduler,
            workdir: workdir.into(),
            project_root: project_root.into(),
        }
    }

    /// Pre-dispatch checks for one unit, producing its stage context
    pub fn prepare(
        &self,
        stage: &dyn Stage,
        unit: &WorkUnit,
        precondition: Option<&str>,
    ) -> Result<StageContext, SkipReason> {
        let output_dir = unit.leaf_dir.join(stage.output_subdirectory());
        let mut ctx = StageContext::new(unit.clone(), stage.key(), &self.project_root, output_dir);

        if stage.requires_upstream_artifact() {
            let artifact = stage.upstream_artifact(unit);
            if !artifact.is_file() {
                return Err(SkipReason::MissingUpstreamArtifact(artifact));
            }
            ctx = ctx.with_upstream_artifact(artifact);
        }

        if stage.requires_primary_config() {
            let config = unit.primary_config();
            if !config.is_file() {
                return Err(SkipReason::MissingPrimaryConfig(config));
            }
            ctx = ctx.with_primary_config(config);
        }

        let precondition = match self.mode {
            DispatchMode::Cluster => precondition.map(str::to_string),
            DispatchMode::Local => None,
        };
        Ok(ctx.with_precondition(precondition))
    }

    /// Execute one request; cluster job ids land in `deps`
    pub async fn dispatch(&self, request: JobRequest, deps: &mut DependencySet) -> Job {
        let mut job = Job::new(&request, self.mode);

        if let Err(e) = tokio::fs::create_dir_all(&request.output_dir).await {
            warn!(stage = %request.stage_key, tag = %request.label,
                "[{}][{}] cannot create {}: {}",
                request.stage_key, request.label, request.output_dir.display(), e);
            job.fail(format!("cannot create output directory: {}", e));
            return job;
        }

        match self.mode {
            DispatchMode::Local => self.run_local(&request, &mut job).await,
            DispatchMode::Cluster => self.submit(&request, &mut job, deps).await,
        }
        job
    }

    async fn run_local(&self, request: &JobRequest, job: &mut Job) {
        job.start();
        let mut errors = Vec::new();

        for command in &request.commands {
            info!(stage = %request.stage_key, tag = %request.label, "running {}", command);
            match self.runner.run(command, &self.workdir).await {
                Ok(output) if output.success() => {}
                Ok(output) => {
                    warn!(stage = %request.stage_key, tag = %request.label,
                        "[{}][{}] command failed with {}",
                        request.stage_key, request.label, output.describe_exit());
                    errors.push(output.describe_exit());
                }
                Err(e) => {
                    warn!(stage = %request.stage_key, tag = %request.label,
                        "[{}][{}] {}", request.stage_key, request.label, e);
                    errors.push(e.to_string());
                }
            }
        }

        if errors.is_empty() {
            job.succeed();
        } else {
            job.fail(errors.join("; "));
        }
    }

    async fn submit(&self, request: &JobRequest, job: &mut Job, deps: &mut DependencySet) {
        let script_path = request.script_path();
        let script = BatchScript::new(request, &self.workdir).render();

        if let Err(e) = write_script(&script_path, &script).await {
            warn!(stage = %request.stage_key, tag = %request.label,
                "[{}][{}] cannot write {}: {}",
                request.stage_key, request.label, script_path.display(), e);
            job.fail(format!("cannot write batch script: {}", e));
            return;
        }
        debug!("wrote {}", script_path.display());
        job.script_written(script_path.clone());

        let stdout = match self.scheduler.submit(&script_path).await {
            Ok(stdout) => stdout,
            Err(e) => {
                warn!(stage = %request.stage_key, tag = %request.label,
                    "[{}][{}] submission failed: {}", request.stage_key, request.label, e);
                job.fail(e.to_string());
                return;
            }
        };

        match extract_job_id(&stdout) {
            Some(job_id) => {
                info!(stage = %request.stage_key, tag = %request.label,
                    "submitted job {}", job_id);
                deps.push(job_id.clone());
                job.submitted(job_id);
            }
            None => {
                warn!(stage = %request.stage_key, tag = %request.label,
                    "[{}][{}] no job id in scheduler output (the job may still have been queued): {}",
                    request.stage_key, request.label, stdout.trim());
                job.fail(format!("unrecognised submission output: {}", stdout.trim()));
            }
        }
    }
}

async fn write_script(path: &Path, content: &str) -> std::io::Result<()> {
    tokio::fs::write(path, content).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    }

    Ok(())
}
