//! Event filtering: writes the filtered artifact every later stage reads

use crate::core::{config::ComputeSettings, CommandSpec, ResourceProfile, StageContext};
use crate::stage::{MacroCall, Stage};
use std::path::Path;

pub struct FilterTree {
    compute: ComputeSettings,
    max_entries: i64,
}

impl FilterTree {
    pub const KEY: &'static str = "filterTree";

    pub fn new(compute: ComputeSettings, max_entries: i64) -> Self {
        Self {
            compute,
            max_entries,
        }
    }

    fn call(&self, name: &str, ctx: &StageContext, config: &Path) -> CommandSpec {
        let unit = ctx.unit();
        MacroCall::new(name)
            .path(&unit.source_path)
            .text(&unit.stream_name)
            .path(config)
            .text(&unit.pair_name)
            .path(&unit.leaf_dir)
            .int(self.max_entries)
            .command(&self.compute)
    }
}

impl Stage for FilterTree {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn requires_upstream_artifact(&self) -> bool {
        false
    }

    fn requires_primary_config(&self) -> bool {
        true
    }

    fn repopulates_tree(&self) -> bool {
        true
    }

    fn build_commands(&self, ctx: &StageContext) -> Vec<CommandSpec> {
        let Some(config) = ctx.primary_config() else {
            return Vec::new();
        };

        let mut commands = vec![self.call("filterTree", ctx, config)];
        if ctx.unit().is_simulated() {
            commands.push(self.call("filterTreeMC", ctx, config));
        }
        commands
    }

    fn resource_profile(&self) -> ResourceProfile {
        ResourceProfile::new("08:00:00", 2000, 1)
    }

    fn job_name(&self, tag: &str) -> String {
        format!("ft_{}", tag)
    }
}
