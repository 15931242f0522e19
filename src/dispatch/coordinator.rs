//! Pipeline coordinator - sequences stages and threads job ids between them

use crate::backend::{ClusterScheduler, CommandRunner};
use crate::core::{
    config::{PipelineConfig, Settings, StageEntry},
    dependency::{merged_precondition, parse_report_line},
    discovery::{discover, normalize_filter_token, DiscoveryOptions},
    CommandSpec, CoordinatorState, DependencySet, DispatchMode, ExecutionStatus, Job, JobState,
    OrchestratorError, RunReport, StageReport, StageStatus,
};
use crate::dispatch::{
    wait::{wait_for_jobs, WaitError, WaitPolicy},
    JobDispatcher,
};
use crate::stage::{create_stage, Stage, StageOptions};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events published while a pipeline runs
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    RunStarted {
        run_id: Uuid,
        project: String,
        stages: usize,
    },
    StageStarted {
        stage: String,
        mode: DispatchMode,
        precondition: Option<String>,
    },
    StageUnknown {
        stage: String,
    },
    StageSkipped {
        stage: String,
        reason: String,
    },
    UnitSkipped {
        stage: String,
        tag: String,
        reason: String,
    },
    JobFinished {
        stage: String,
        job: Job,
    },
    ExternalOutput {
        stage: String,
        output: String,
    },
    WaitingForJobs {
        stage: String,
        remaining: usize,
    },
    StageCompleted {
        report: StageReport,
    },
    RunCompleted {
        run_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(PipelineEvent) + Send + Sync>;

/// Run-wide switches, mostly straight from the command line
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: DispatchMode,

    /// Keep existing configuration copies and skip tree-repopulating stages
    pub append: bool,

    /// Ignore stage selection predicates and the configuration filter
    pub all: bool,

    /// Stop at the first failed dispatch
    pub fail_fast: bool,

    /// Block on upstream cluster jobs before every stage
    pub wait: bool,

    pub config_filter: Vec<String>,
    pub max_per_config: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Local,
            append: false,
            all: false,
            fail_fast: false,
            wait: false,
            config_filter: Vec::new(),
            max_per_config: None,
        }
    }
}

pub struct PipelineCoordinator {
    project: String,
    settings: Settings,
    options: RunOptions,
    stage_options: StageOptions,
    wait_policy: WaitPolicy,
    runner: Arc<dyn CommandRunner>,
    scheduler: Arc<dyn ClusterScheduler>,
    workdir: PathBuf,
    state: CoordinatorState,
    history: HashMap<String, DependencySet>,
    event_handlers: Vec<EventHandler>,
}

impl PipelineCoordinator {
    pub fn new(
        project: impl Into<String>,
        settings: Settings,
        runner: Arc<dyn CommandRunner>,
        scheduler: Arc<dyn ClusterScheduler>,
    ) -> Self {
        let stage_options = StageOptions {
            compute: settings.compute.clone(),
            ..StageOptions::default()
        };
        let wait_policy = WaitPolicy::from_settings(&settings.scheduler);

        Self {
            project: project.into(),
            settings,
            options: RunOptions::default(),
            stage_options,
            wait_policy,
            runner,
            scheduler,
            workdir: PathBuf::from("."),
            state: CoordinatorState::NotStarted,
            history: HashMap::new(),
            event_handlers: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_stage_options(mut self, stage_options: StageOptions) -> Self {
        self.stage_options = stage_options;
        self
    }

    pub fn with_wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.wait_policy = policy;
        self
    }

    /// Directory commands run in and batch scripts `cd` into
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(PipelineEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    fn emit(&self, event: PipelineEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// `<output_base>/<project>`
    pub fn project_root(&self) -> PathBuf {
        self.settings.project_root(&self.project)
    }

    /// Job ids a finished stage produced in the current run
    pub fn dependencies(&self, stage: &str) -> Option<&DependencySet> {
        self.history.get(stage)
    }

    fn dispatcher(&self, mode: DispatchMode) -> JobDispatcher {
        JobDispatcher::new(
            mode,
            self.runner.clone(),
            self.scheduler.clone(),
            self.workdir.clone(),
            self.project_root(),
        )
    }

    /// Copy configuration files into `config_<stem>/` under the project root.
    ///
    /// In append mode a configuration directory that already exists is left
    /// untouched.
    pub fn install_configs(&self, configs: &[PathBuf]) -> Result<Vec<PathBuf>, OrchestratorError> {
        let root = self.project_root();
        let mut installed = Vec::with_capacity(configs.len());

        for config in configs {
            let dir = root.join(normalize_filter_token(&config.to_string_lossy()));
            if self.options.append && dir.is_dir() {
                debug!("keeping existing {}", dir.display());
                continue;
            }

            let file_name = config
                .file_name()
                .ok_or_else(|| OrchestratorError::InvalidPipelineSpec(format!(
                    "'{}' is not a configuration file",
                    config.display()
                )))?;

            std::fs::create_dir_all(&dir).map_err(|e| OrchestratorError::io(&dir, e))?;
            let target = dir.join(file_name);
            std::fs::copy(config, &target).map_err(|e| OrchestratorError::io(config, e))?;
            info!("installed {} -> {}", config.display(), target.display());
            installed.push(target);
        }

        Ok(installed)
    }

    /// Run every stage of the pipeline in order.
    ///
    /// Only structural problems are errors. A fail-fast abort returns a report
    /// whose status is `Failed`.
    pub async fn run(&mut self, pipeline: &PipelineConfig) -> Result<RunReport, OrchestratorError> {
        let root = self.project_root();
        if !root.is_dir() {
            return Err(OrchestratorError::MissingRoot(root));
        }

        let entries = pipeline.entries();
        let mut report = RunReport::new(self.project.clone());
        report.start();
        self.history.clear();

        info!(
            "Starting pipeline {} for {} ({})",
            pipeline.name.as_deref().unwrap_or("<unnamed>"),
            self.project,
            report.run_id
        );
        self.emit(PipelineEvent::RunStarted {
            run_id: report.run_id,
            project: self.project.clone(),
            stages: entries.len(),
        });

        for (stage_index, entry) in entries.iter().enumerate() {
            self.state = CoordinatorState::Running { stage_index };

            let stage_report = self.run_entry(entry).await?;
            self.history
                .insert(entry.name.clone(), stage_report.dependencies.clone());

            let aborted = matches!(stage_report.status, StageStatus::Aborted { .. });
            self.emit(PipelineEvent::StageCompleted {
                report: stage_report.clone(),
            });
            report.stages.push(stage_report);

            if aborted {
                error!("Stopping after failure in stage {}", entry.name);
                report.fail();
                self.state = CoordinatorState::Completed;
                self.emit(PipelineEvent::RunCompleted {
                    run_id: report.run_id,
                    status: report.status,
                });
                return Ok(report);
            }
        }

        report.complete();
        self.state = CoordinatorState::Completed;
        info!(
            "Pipeline finished: {} jobs dispatched, {} failed",
            report.total_dispatched(),
            report.total_failed()
        );
        self.emit(PipelineEvent::RunCompleted {
            run_id: report.run_id,
            status: report.status,
        });
        Ok(report)
    }

    async fn run_entry(&self, entry: &StageEntry) -> Result<StageReport, OrchestratorError> {
        let mode = entry.mode.unwrap_or(self.options.mode);
        let upstream: Vec<&DependencySet> = entry
            .after
            .iter()
            .filter_map(|name| self.history.get(name))
            .collect();
        let precondition = match mode {
            DispatchMode::Cluster => merged_precondition(upstream.iter().copied()),
            DispatchMode::Local => None,
        };

        let stage = if entry.is_external() {
            None
        } else {
            match create_stage(&entry.name, &self.stage_options) {
                Some(stage) => Some(stage),
                None => {
                    warn!("Unknown stage '{}', skipping", entry.name);
                    self.emit(PipelineEvent::StageUnknown {
                        stage: entry.name.clone(),
                    });
                    return Ok(StageReport::new(&entry.name, mode).with_status(StageStatus::Unknown));
                }
            }
        };

        if let Some(stage) = &stage {
            if self.options.append && stage.repopulates_tree() {
                return Ok(self.skip_stage(&entry.name, mode, "tree is not repopulated in append mode"));
            }
        }

        let upstream_ids: Vec<String> = merged_ids(&upstream);
        if !upstream_ids.is_empty() && (self.options.wait || mode == DispatchMode::Local) {
            if let Err(e) = self.wait_for_upstream(&entry.name, &upstream_ids).await {
                return Ok(self.skip_stage(&entry.name, mode, &e.to_string()));
            }
        }

        match stage {
            Some(stage) => self.run_stage(stage.as_ref(), mode, precondition).await,
            None => Ok(self.run_external(entry, mode, precondition).await),
        }
    }

    fn skip_stage(&self, name: &str, mode: DispatchMode, reason: &str) -> StageReport {
        warn!("Skipping stage {}: {}", name, reason);
        self.emit(PipelineEvent::StageSkipped {
            stage: name.to_string(),
            reason: reason.to_string(),
        });
        StageReport::new(name, mode).with_status(StageStatus::Skipped {
            reason: reason.to_string(),
        })
    }

    async fn wait_for_upstream(
        &self,
        stage: &str,
        ids: &[String],
    ) -> Result<(), WaitError> {
        info!("Stage {} waits for {} cluster jobs", stage, ids.len());
        wait_for_jobs(self.scheduler.as_ref(), ids, self.wait_policy, |remaining| {
            self.emit(PipelineEvent::WaitingForJobs {
                stage: stage.to_string(),
                remaining,
            })
        })
        .await
    }

    /// Run one registered stage across every eligible unit
    pub async fn run_stage(
        &self,
        stage: &dyn Stage,
        mode: DispatchMode,
        precondition: Option<String>,
    ) -> Result<StageReport, OrchestratorError> {
        let key = stage.key().to_string();
        let dispatcher = self.dispatcher(mode);
        let precondition = precondition.filter(|_| mode == DispatchMode::Cluster);

        let filter: &[String] = if self.options.all {
            &[]
        } else {
            &self.options.config_filter
        };
        let discovery = DiscoveryOptions::new(self.settings.manifest_name.clone())
            .with_filter(filter)
            .with_max_per_config(self.options.max_per_config);
        let units = discover(&self.project_root(), &discovery)?;

        info!("Running stage {} ({}) over {} units", key, mode, units.len());
        self.emit(PipelineEvent::StageStarted {
            stage: key.clone(),
            mode,
            precondition: precondition.clone(),
        });

        let mut report = StageReport::new(&key, mode);
        report.precondition = precondition.clone();
        let mut deps = DependencySet::new(&key);

        for unit in &units {
            if !self.options.all && !stage.keep_unit(unit) {
                debug!(stage = %key, tag = %unit.tag, "not selected");
                report.filtered += 1;
                continue;
            }

            let outcome = match dispatcher.prepare(stage, unit, precondition.as_deref()) {
                Ok(ctx) => stage.process_unit(&ctx, &dispatcher, &mut deps).await,
                Err(reason) => Err(reason),
            };

            let jobs = match outcome {
                Ok(jobs) => jobs,
                Err(reason) => {
                    warn!(stage = %key, tag = %unit.tag, "[{}][{}] skipped: {}", key, unit.tag, reason);
                    report.skipped += 1;
                    self.emit(PipelineEvent::UnitSkipped {
                        stage: key.clone(),
                        tag: unit.tag.clone(),
                        reason: reason.to_string(),
                    });
                    continue;
                }
            };

            for job in jobs {
                match job.state {
                    JobState::Succeeded { .. } => report.succeeded += 1,
                    JobState::Submitted { .. } => report.submitted += 1,
                    _ => report.failed += 1,
                }
                let failed = job.is_failed();
                self.emit(PipelineEvent::JobFinished {
                    stage: key.clone(),
                    job,
                });

                if failed && self.options.fail_fast {
                    report.dependencies = deps;
                    report.status = StageStatus::Aborted {
                        tag: unit.tag.clone(),
                    };
                    return Ok(report);
                }
            }
        }

        report.dependencies = deps;
        Ok(report)
    }

    /// Run an external command as a stage; job ids come from its report line
    async fn run_external(
        &self,
        entry: &StageEntry,
        mode: DispatchMode,
        precondition: Option<String>,
    ) -> StageReport {
        let mut report = StageReport::new(&entry.name, mode);
        report.precondition = precondition.clone();

        let argv = entry.command.clone().unwrap_or_default();
        let Some((program, args)) = argv.split_first() else {
            return report.with_status(StageStatus::Skipped {
                reason: "empty command".to_string(),
            });
        };

        let mut command = CommandSpec::new(program.clone()).args(args.iter().cloned());
        if mode == DispatchMode::Cluster {
            command = command.arg("--cluster");
            if let Some(precondition) = &precondition {
                command = command.args(["--dependency", precondition.as_str()]);
            }
        }

        info!("Running external stage {}: {}", entry.name, command);
        self.emit(PipelineEvent::StageStarted {
            stage: entry.name.clone(),
            mode,
            precondition,
        });

        match self.runner.capture(&command, &self.workdir).await {
            Ok(output) => {
                if !output.stdout.is_empty() {
                    self.emit(PipelineEvent::ExternalOutput {
                        stage: entry.name.clone(),
                        output: output.stdout.clone(),
                    });
                }
                let ids = parse_report_line(&output.stdout).unwrap_or_default();
                report.dependencies = DependencySet::from_ids(&entry.name, ids);

                if !output.success() {
                    warn!(stage = %entry.name, "[{}] external command failed with {}: {}",
                        entry.name, output.describe_exit(), output.stderr.trim());
                    report.failed = 1;
                } else if report.dependencies.is_empty() {
                    report.succeeded = 1;
                } else {
                    report.submitted = report.dependencies.len();
                }
            }
            Err(e) => {
                warn!(stage = %entry.name, "[{}] {}", entry.name, e);
                report.failed = 1;
            }
        }

        if report.failed > 0 && self.options.fail_fast {
            report.status = StageStatus::Aborted {
                tag: self.project.clone(),
            };
        }
        report
    }
}

/// Union of several sets' ids in first-seen order
fn merged_ids(sets: &[&DependencySet]) -> Vec<String> {
    let mut merged = DependencySet::default();
    for set in sets {
        for id in set.ids() {
            merged.push(id.clone());
        }
    }
    merged.ids().to_vec()
}

