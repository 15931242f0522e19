//! Toy-signal injection: data leaves paired with their simulated counterpart

use crate::core::{
    config::ComputeSettings, work_unit::Manifest, CommandSpec, DependencySet, Job, JobRequest,
    ResourceProfile, SkipReason, StageContext, WorkUnit,
};
use crate::dispatch::JobDispatcher;
use crate::stage::{asymmetry::Asymmetry, MacroCall, Stage, STAGE_OUTPUT_PREFIX};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Data tag to the simulated tag modelling it
const RUN_TO_MC: &[(&str, &str)] = &[
    ("Fall2018_RGA_inbending", "MC_RGA_inbending"),
    ("Spring2019_RGA_inbending", "MC_RGA_inbending"),
    ("Fall2018_RGA_outbending", "MC_RGA_outbending"),
    ("Fall2018Spring2019_RGA_inbending", "MC_RGA_inbending"),
];

/// Result files the asymmetry stage may leave in a data leaf, in lookup order
const DATA_RESULT_NAMES: &[&str] = &["asymmetry_results.yaml", "asymmetry.yaml"];

const COUNTERPART_ARTIFACT: &str = "counterpart_artifact";
const DATA_RESULT: &str = "data_result";
const TRIAL: &str = "trial";

pub fn counterpart_tag(tag: &str) -> Option<&'static str> {
    RUN_TO_MC
        .iter()
        .find(|(data, _)| *data == tag)
        .map(|(_, mc)| *mc)
}

pub struct AsymmetryInjection {
    compute: ComputeSettings,
    jobs: usize,
    per_job: usize,
}

impl AsymmetryInjection {
    pub const KEY: &'static str = "asymmetryInjection";

    pub fn new(compute: ComputeSettings, jobs: usize, per_job: usize) -> Self {
        Self {
            compute,
            jobs: jobs.max(1),
            per_job: per_job.max(1),
        }
    }

    /// Filtered artifact of the simulated leaf matching this data leaf
    fn counterpart_artifact(&self, unit: &WorkUnit) -> Result<PathBuf, SkipReason> {
        let mc_tag =
            counterpart_tag(&unit.tag).ok_or_else(|| SkipReason::NoCounterpart(unit.tag.clone()))?;

        let mc_leaf = unit.config_dir.join(&unit.pair_name).join(mc_tag);
        let manifest_name = unit
            .manifest_path
            .file_name()
            .map(Path::new)
            .unwrap_or_else(|| Path::new("tree_info.yaml"));
        let mc_manifest = mc_leaf.join(manifest_name);

        let (mc_source, _) = Manifest::load(&mc_manifest)
            .map_err(|_| SkipReason::MissingCounterpartInput(mc_manifest.clone()))?;

        let file_name = Path::new(&mc_source)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        let filtered = mc_leaf.join(file_name);
        if !filtered.is_file() {
            return Err(SkipReason::MissingCounterpartInput(filtered));
        }
        Ok(filtered)
    }

    fn data_result(&self, unit: &WorkUnit) -> Result<PathBuf, SkipReason> {
        let dir = unit
            .leaf_dir
            .join(format!("{}{}", STAGE_OUTPUT_PREFIX, Asymmetry::KEY));
        DATA_RESULT_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| SkipReason::MissingCounterpartInput(dir.join(DATA_RESULT_NAMES[0])))
    }
}

#[async_trait]
impl Stage for AsymmetryInjection {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn keep_unit(&self, unit: &WorkUnit) -> bool {
        !unit.tag.starts_with("MC_")
    }

    fn requires_upstream_artifact(&self) -> bool {
        false
    }

    /// One trial; needs the counterpart inputs and trial number as extras
    fn build_commands(&self, ctx: &StageContext) -> Vec<CommandSpec> {
        let (Some(artifact), Some(result), Some(trial)) = (
            ctx.extra(COUNTERPART_ARTIFACT),
            ctx.extra(DATA_RESULT),
            ctx.extra(TRIAL).and_then(|t| t.parse::<i64>().ok()),
        ) else {
            return Vec::new();
        };

        let unit = ctx.unit();
        vec![MacroCall::new("injectAsymmetry")
            .text(artifact)
            .text(&unit.stream_name)
            .text(&unit.pair_name)
            .path(ctx.output_dir())
            .text(result)
            .int(trial)
            .command(&self.compute)]
    }

    fn resource_profile(&self) -> ResourceProfile {
        ResourceProfile::new("24:00:00", 4000, 1)
    }

    fn job_name(&self, label: &str) -> String {
        format!("inj_{}", label)
    }

    async fn process_unit(
        &self,
        ctx: &StageContext,
        dispatcher: &JobDispatcher,
        deps: &mut DependencySet,
    ) -> Result<Vec<Job>, SkipReason> {
        let unit = ctx.unit();
        let artifact = self.counterpart_artifact(unit)?;
        let result = self.data_result(unit)?;

        let base = ctx
            .with_extra(COUNTERPART_ARTIFACT, StageContext::display_path(&artifact))
            .with_extra(DATA_RESULT, StageContext::display_path(&result));

        let trials: Vec<CommandSpec> = (0..self.jobs * self.per_job)
            .flat_map(|trial| self.build_commands(&base.with_extra(TRIAL, trial.to_string())))
            .collect();
        debug!(tag = %unit.tag, "{} injection trials", trials.len());

        let mut jobs = Vec::with_capacity(self.jobs);
        for (index, batch) in trials.chunks(self.per_job).enumerate() {
            let label = format!("{}_batch{}", unit.tag, index);
            let request = JobRequest::for_context(&base, batch.to_vec())
                .with_job_name(self.job_name(&label))
                .with_label(label)
                .with_profile(self.resource_profile());
            jobs.push(dispatcher.dispatch(request, deps).await);
        }

        Ok(jobs)
    }
}
