//! Asymmetry extraction, plus the sideband variant that sweeps background regions

use crate::core::{
    config::ComputeSettings, CommandSpec, DependencySet, Job, JobRequest, ResourceProfile,
    SkipReason, StageContext, WorkUnit,
};
use crate::dispatch::JobDispatcher;
use crate::stage::{binning::binned_call, MacroCall, Stage};
use async_trait::async_trait;
use std::path::PathBuf;

pub struct Asymmetry {
    compute: ComputeSettings,
}

impl Asymmetry {
    pub const KEY: &'static str = "asymmetry";

    pub fn new(compute: ComputeSettings) -> Self {
        Self { compute }
    }
}

impl Stage for Asymmetry {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn build_commands(&self, ctx: &StageContext) -> Vec<CommandSpec> {
        vec![binned_call(Self::KEY, ctx).command(&self.compute)]
    }

    fn resource_profile(&self) -> ResourceProfile {
        ResourceProfile::new("24:00:00", 4000, 1)
    }
}

const SIGNAL_REGION: &str = "M2>0.106 && M2<0.166";

const BACKGROUND_REGIONS: &[&str] = &[
    "M2>0.2&&M2<0.45",
    "M2>0.2&&M2<0.4",
    "M2>0.2&&M2<0.35",
    "M2>0.2&&M2<0.3",
    "(M2>0&&M2<0.08)||(M2>0.2&&M2<0.4)",
];

/// Runs the asymmetry macro once per background-region variant, each job in
/// its own output directory
pub struct AsymmetrySideband {
    compute: ComputeSettings,
}

impl AsymmetrySideband {
    pub const KEY: &'static str = "asymmetrySideband";

    pub fn new(compute: ComputeSettings) -> Self {
        Self { compute }
    }

    fn region_output_dir(&self, ctx: &StageContext, region: &str) -> PathBuf {
        ctx.unit()
            .leaf_dir
            .join(format!("{}_{}", self.output_subdirectory(), sanitize_region(region)))
    }

    fn region_command(&self, ctx: &StageContext, region: &str) -> CommandSpec {
        let unit = ctx.unit();
        MacroCall::new(Asymmetry::KEY)
            .path(&ctx.input_file())
            .text(&unit.stream_name)
            .text(&unit.pair_name)
            .path(&self.region_output_dir(ctx, region))
            .text(SIGNAL_REGION)
            .text(region)
            .command(&self.compute)
    }
}

#[async_trait]
impl Stage for AsymmetrySideband {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn keep_unit(&self, unit: &WorkUnit) -> bool {
        unit.pair_name.contains("pi0") && !unit.is_simulated()
    }

    /// One command per background region, in region order
    fn build_commands(&self, ctx: &StageContext) -> Vec<CommandSpec> {
        BACKGROUND_REGIONS
            .iter()
            .map(|region| self.region_command(ctx, region))
            .collect()
    }

    fn resource_profile(&self) -> ResourceProfile {
        ResourceProfile::new("24:00:00", 4000, 4)
    }

    async fn process_unit(
        &self,
        ctx: &StageContext,
        dispatcher: &JobDispatcher,
        deps: &mut DependencySet,
    ) -> Result<Vec<Job>, SkipReason> {
        let mut jobs = Vec::with_capacity(BACKGROUND_REGIONS.len());

        for (region, command) in BACKGROUND_REGIONS.iter().zip(self.build_commands(ctx)) {
            let sanitized = sanitize_region(region);
            let request = JobRequest::for_context(ctx, vec![command])
                .with_output_dir(self.region_output_dir(ctx, region))
                .with_label(format!("{}_{}", ctx.unit().tag, sanitized))
                .with_job_name(format!("asym_sb_{}_{}", ctx.unit().pair_name, sanitized))
                .with_profile(self.resource_profile());
            jobs.push(dispatcher.dispatch(request, deps).await);
        }

        Ok(jobs)
    }
}

/// Directory- and job-name-safe form of a region expression
pub fn sanitize_region(region: &str) -> String {
    let mut out = String::with_capacity(region.len());
    for c in region.chars().filter(|c| !c.is_whitespace()) {
        let c = if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('_').to_string()
}
