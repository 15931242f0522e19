//! Corrections computed from simulated leaves only

use crate::core::{config::ComputeSettings, CommandSpec, ResourceProfile, StageContext, WorkUnit};
use crate::stage::{MacroCall, Stage};
use std::path::PathBuf;

fn simulated(unit: &WorkUnit) -> bool {
    unit.is_simulated()
}

/// Baryon contamination estimate from the unfiltered source
pub struct BaryonContamination {
    compute: ComputeSettings,
}

impl BaryonContamination {
    pub const KEY: &'static str = "baryonContamination";

    pub fn new(compute: ComputeSettings) -> Self {
        Self { compute }
    }
}

impl Stage for BaryonContamination {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn keep_unit(&self, unit: &WorkUnit) -> bool {
        simulated(unit)
    }

    fn requires_primary_config(&self) -> bool {
        true
    }

    fn build_commands(&self, ctx: &StageContext) -> Vec<CommandSpec> {
        let Some(config) = ctx.primary_config() else {
            return Vec::new();
        };
        let unit = ctx.unit();
        vec![MacroCall::new(Self::KEY)
            .path(&unit.source_path)
            .text(&unit.stream_name)
            .path(config)
            .path(&ctx.output_dir().join("baryonContamination.yaml"))
            .command(&self.compute)]
    }

    fn resource_profile(&self) -> ResourceProfile {
        ResourceProfile::new("24:00:00", 4000, 1)
    }

    fn job_name(&self, tag: &str) -> String {
        format!("baryonCont_{}", tag)
    }
}

/// Generated-vs-reconstructed bin migration; reads the generator-level artifact
pub struct BinMigration {
    compute: ComputeSettings,
}

impl BinMigration {
    pub const KEY: &'static str = "binMigration";

    pub fn new(compute: ComputeSettings) -> Self {
        Self { compute }
    }
}

impl Stage for BinMigration {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn keep_unit(&self, unit: &WorkUnit) -> bool {
        simulated(unit)
    }

    fn upstream_artifact(&self, unit: &WorkUnit) -> PathBuf {
        unit.leaf_dir.join(format!("gen_{}", unit.source_file_name()))
    }

    fn requires_primary_config(&self) -> bool {
        true
    }

    fn build_commands(&self, ctx: &StageContext) -> Vec<CommandSpec> {
        let Some(config) = ctx.primary_config() else {
            return Vec::new();
        };
        let unit = ctx.unit();
        vec![MacroCall::new(Self::KEY)
            .path(&unit.source_path)
            .text(&unit.stream_name)
            .path(config)
            .path(ctx.project_root())
            .path(&ctx.output_dir().join("binMigration.yaml"))
            .command(&self.compute)]
    }
}

pub struct ParticleMisidentification {
    compute: ComputeSettings,
}

impl ParticleMisidentification {
    pub const KEY: &'static str = "particleMisidentification";

    pub fn new(compute: ComputeSettings) -> Self {
        Self { compute }
    }
}

impl Stage for ParticleMisidentification {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn keep_unit(&self, unit: &WorkUnit) -> bool {
        simulated(unit)
    }

    fn build_commands(&self, ctx: &StageContext) -> Vec<CommandSpec> {
        vec![MacroCall::new(Self::KEY)
            .path(&ctx.input_file())
            .text(&ctx.unit().stream_name)
            .path(&ctx.output_dir().join("particleMisidentification.yaml"))
            .command(&self.compute)]
    }
}
