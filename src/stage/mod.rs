//! Pluggable pipeline stages
//!
//! A [`Stage`] decides which work units it acts on, builds the external
//! commands for each one and names its output location. Most stages only
//! supply [`Stage::build_commands`]; stages whose natural unit of dispatch is
//! not "one job per leaf" override [`Stage::process_unit`].

pub mod asymmetry;
pub mod binning;
pub mod filter;
pub mod inject;
pub mod macro_call;
pub mod monte_carlo;

use crate::core::{
    config::ComputeSettings, CommandSpec, DependencySet, Job, JobRequest, ResourceProfile,
    SkipReason, StageContext, WorkUnit,
};
use crate::dispatch::JobDispatcher;
use async_trait::async_trait;
use std::path::PathBuf;

pub use macro_call::MacroCall;

/// Prefix of every stage output directory inside a leaf
pub const STAGE_OUTPUT_PREFIX: &str = "stage-out___";

/// One named step of the pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    /// Name used in pipeline specifications and output paths
    fn key(&self) -> &str;

    /// Selection predicate
    fn keep_unit(&self, _unit: &WorkUnit) -> bool {
        true
    }

    /// Whether the upstream artifact must exist before dispatch
    fn requires_upstream_artifact(&self) -> bool {
        true
    }

    fn upstream_artifact(&self, unit: &WorkUnit) -> PathBuf {
        unit.default_artifact()
    }

    /// Whether the configuration's primary YAML must exist before dispatch
    fn requires_primary_config(&self) -> bool {
        false
    }

    /// Stage rewrites the tree's artifacts and is skipped when appending
    fn repopulates_tree(&self) -> bool {
        false
    }

    /// Fully resolved invocations for one unit; empty means nothing to do
    fn build_commands(&self, ctx: &StageContext) -> Vec<CommandSpec>;

    fn output_subdirectory(&self) -> String {
        format!("{}{}", STAGE_OUTPUT_PREFIX, self.key())
    }

    fn resource_profile(&self) -> ResourceProfile {
        ResourceProfile::default()
    }

    fn job_name(&self, tag: &str) -> String {
        format!("{}_{}", self.key(), tag)
    }

    /// Dispatch everything this stage does for one prepared unit
    async fn process_unit(
        &self,
        ctx: &StageContext,
        dispatcher: &JobDispatcher,
        deps: &mut DependencySet,
    ) -> Result<Vec<Job>, SkipReason> {
        let commands = self.build_commands(ctx);
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let request = JobRequest::for_context(ctx, commands)
            .with_profile(self.resource_profile())
            .with_job_name(self.job_name(&ctx.unit().tag));

        Ok(vec![dispatcher.dispatch(request, deps).await])
    }
}

/// Run-wide knobs handed to stage constructors
#[derive(Debug, Clone)]
pub struct StageOptions {
    pub compute: ComputeSettings,

    /// Entry limit forwarded to the filter; -1 means all
    pub max_entries: i64,

    /// Number of injection jobs per data leaf
    pub injection_jobs: usize,

    /// Trials inside each injection job
    pub injection_per_job: usize,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            compute: ComputeSettings::default(),
            max_entries: -1,
            injection_jobs: 4,
            injection_per_job: 3,
        }
    }
}

const KNOWN_STAGES: &[&str] = &[
    filter::FilterTree::KEY,
    binning::PurityBinning::KEY,
    binning::KinematicBins::KEY,
    asymmetry::Asymmetry::KEY,
    asymmetry::AsymmetrySideband::KEY,
    monte_carlo::BaryonContamination::KEY,
    monte_carlo::BinMigration::KEY,
    monte_carlo::ParticleMisidentification::KEY,
    inject::AsymmetryInjection::KEY,
];

/// Stage keys accepted in pipeline specifications
pub fn known_stages() -> &'static [&'static str] {
    KNOWN_STAGES
}

/// Instantiate a stage by its pipeline-specification name
pub fn create_stage(name: &str, options: &StageOptions) -> Option<Box<dyn Stage>> {
    let compute = options.compute.clone();
    let stage: Box<dyn Stage> = match name {
        filter::FilterTree::KEY => Box::new(filter::FilterTree::new(compute, options.max_entries)),
        binning::PurityBinning::KEY => Box::new(binning::PurityBinning::new(compute)),
        binning::KinematicBins::KEY => Box::new(binning::KinematicBins::new(compute)),
        asymmetry::Asymmetry::KEY => Box::new(asymmetry::Asymmetry::new(compute)),
        asymmetry::AsymmetrySideband::KEY => Box::new(asymmetry::AsymmetrySideband::new(compute)),
        monte_carlo::BaryonContamination::KEY => {
            Box::new(monte_carlo::BaryonContamination::new(compute))
        }
        monte_carlo::BinMigration::KEY => Box::new(monte_carlo::BinMigration::new(compute)),
        monte_carlo::ParticleMisidentification::KEY => {
            Box::new(monte_carlo::ParticleMisidentification::new(compute))
        }
        inject::AsymmetryInjection::KEY => Box::new(inject::AsymmetryInjection::new(
            compute,
            options.injection_jobs,
            options.injection_per_job,
        )),
        _ => return None,
    };
    Some(stage)
}
