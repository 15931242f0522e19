//! Binning stages over the filtered artifact

use crate::core::{config::ComputeSettings, CommandSpec, ResourceProfile, StageContext, WorkUnit};
use crate::stage::{MacroCall, Stage};

/// Signal purity per kinematic bin, for neutral-pion channels only
pub struct PurityBinning {
    compute: ComputeSettings,
}

impl PurityBinning {
    pub const KEY: &'static str = "purityBinning";

    pub fn new(compute: ComputeSettings) -> Self {
        Self { compute }
    }
}

impl Stage for PurityBinning {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn keep_unit(&self, unit: &WorkUnit) -> bool {
        unit.pair_name.contains("pi0")
    }

    fn requires_primary_config(&self) -> bool {
        true
    }

    fn build_commands(&self, ctx: &StageContext) -> Vec<CommandSpec> {
        vec![binned_call(Self::KEY, ctx).command(&self.compute)]
    }

    fn resource_profile(&self) -> ResourceProfile {
        ResourceProfile::new("24:00:00", 2000, 1)
    }
}

/// Per-tree kinematic bin summaries
pub struct KinematicBins {
    compute: ComputeSettings,
}

impl KinematicBins {
    pub const KEY: &'static str = "kinematicBins";

    pub fn new(compute: ComputeSettings) -> Self {
        Self { compute }
    }
}

impl Stage for KinematicBins {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn build_commands(&self, ctx: &StageContext) -> Vec<CommandSpec> {
        vec![binned_call(Self::KEY, ctx).command(&self.compute)]
    }
}

/// `(filtered, stream, pair, outdir)`, the argument shape shared by the
/// binning and asymmetry macros
pub(crate) fn binned_call(name: &str, ctx: &StageContext) -> MacroCall {
    let unit = ctx.unit();
    MacroCall::new(name)
        .path(&ctx.input_file())
        .text(&unit.stream_name)
        .text(&unit.pair_name)
        .path(ctx.output_dir())
}
