//! Pipeline specification ("runcard") and orchestrator settings from YAML

use crate::core::{error::OrchestratorError, job::DispatchMode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Top-level pipeline specification loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Optional label for logs
    #[serde(default)]
    pub name: Option<String>,

    /// Ordered stage list
    #[serde(alias = "modules")]
    pub stages: Vec<StageEntryConfig>,

    /// Orchestrator settings
    #[serde(default)]
    pub settings: Settings,
}

/// One stage as written in the runcard: a bare name or a mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageEntryConfig {
    Name(String),
    Detailed(StageEntryDetail),
}

/// Mapping form of a stage entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageEntryDetail {
    pub name: String,

    /// Upstream stages whose jobs must succeed first.
    /// Omitted means the previous entry; an empty list means none.
    #[serde(default)]
    pub after: Option<Vec<String>>,

    /// Override the run-wide dispatch mode for this stage
    #[serde(default)]
    pub mode: Option<DispatchMode>,

    /// Run an external command instead of a registered stage
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

/// A stage entry with its upstream list resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEntry {
    pub name: String,
    pub after: Vec<String>,
    pub mode: Option<DispatchMode>,
    pub command: Option<Vec<String>>,
}

impl StageEntry {
    pub fn is_external(&self) -> bool {
        self.command.is_some()
    }
}

/// Orchestrator settings; every field has a default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding `<project>` output trees
    pub output_base: PathBuf,

    /// Manifest file name inside each leaf
    pub manifest_name: String,

    pub compute: ComputeSettings,
    pub scheduler: SchedulerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_base: PathBuf::from("out"),
            manifest_name: "tree_info.yaml".to_string(),
            compute: ComputeSettings::default(),
            scheduler: SchedulerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a standalone YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, OrchestratorError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| OrchestratorError::io(path, e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| OrchestratorError::InvalidPipelineSpec(format!("{}: {}", path.display(), e)))
    }

    /// `<output_base>/<project>`
    pub fn project_root(&self, project: &str) -> PathBuf {
        self.output_base.join(project)
    }
}

/// How the opaque compute task is invoked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeSettings {
    pub program: String,
    pub args: Vec<String>,

    /// Directory holding the compute macros
    pub macro_dir: String,
}

impl Default for ComputeSettings {
    fn default() -> Self {
        Self {
            program: "root".to_string(),
            args: vec!["-l".to_string(), "-b".to_string(), "-q".to_string()],
            macro_dir: "src/modules".to_string(),
        }
    }
}

/// Cluster scheduler CLI and queue polling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub submit_program: String,
    pub queue_program: String,
    pub queue_args: Vec<String>,
    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,

    /// Consecutive failed queue queries before a wait gives up
    pub max_query_failures: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            submit_program: "sbatch".to_string(),
            queue_program: "squeue".to_string(),
            queue_args: vec!["--noheader".to_string(), "--format=%i".to_string()],
            poll_interval_secs: 60,
            max_wait_secs: 48 * 3600,
            max_query_failures: 5,
        }
    }
}

impl PipelineConfig {
    /// Load a pipeline specification from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, OrchestratorError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| OrchestratorError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse a pipeline specification from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, OrchestratorError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)
            .map_err(|e| OrchestratorError::InvalidPipelineSpec(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks; unknown stage names are left for run time
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        let mut earlier: HashSet<&str> = HashSet::new();

        for entry in &self.stages {
            let (name, after, command) = match entry {
                StageEntryConfig::Name(name) => (name.as_str(), None, None),
                StageEntryConfig::Detailed(detail) => (
                    detail.name.as_str(),
                    detail.after.as_ref(),
                    detail.command.as_ref(),
                ),
            };

            if name.trim().is_empty() {
                return Err(OrchestratorError::InvalidPipelineSpec(
                    "stage names must not be empty".to_string(),
                ));
            }

            for upstream in after.into_iter().flatten() {
                if !earlier.contains(upstream.as_str()) {
                    return Err(OrchestratorError::InvalidPipelineSpec(format!(
                        "stage '{}' runs after '{}', which is not an earlier stage",
                        name, upstream
                    )));
                }
            }

            if command.is_some_and(|c| c.is_empty()) {
                return Err(OrchestratorError::InvalidPipelineSpec(format!(
                    "external stage '{}' has an empty command",
                    name
                )));
            }

            earlier.insert(name);
        }

        Ok(())
    }

    /// Entries in order with default upstreams filled in
    pub fn entries(&self) -> Vec<StageEntry> {
        let mut resolved: Vec<StageEntry> = Vec::with_capacity(self.stages.len());

        for entry in &self.stages {
            let previous = resolved.last().map(|e| e.name.clone());
            let default_after = previous.into_iter().collect::<Vec<_>>();

            resolved.push(match entry {
                StageEntryConfig::Name(name) => StageEntry {
                    name: name.clone(),
                    after: default_after,
                    mode: None,
                    command: None,
                },
                StageEntryConfig::Detailed(detail) => StageEntry {
                    name: detail.name.clone(),
                    after: detail.after.clone().unwrap_or(default_after),
                    mode: detail.mode,
                    command: detail.command.clone(),
                },
            });
        }

        resolved
    }
}
