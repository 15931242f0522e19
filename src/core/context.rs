//! Stage context - read-only view of a work unit for one stage

use crate::core::work_unit::WorkUnit;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Per-(stage, unit) view built once before dispatch.
///
/// Fields are private so the view stays immutable; stages that need more
/// inputs derive an augmented copy with [`StageContext::with_extra`].
#[derive(Debug, Clone)]
pub struct StageContext {
    unit: WorkUnit,
    stage_key: String,
    project_root: PathBuf,
    output_dir: PathBuf,
    upstream_artifact: Option<PathBuf>,
    primary_config: Option<PathBuf>,
    precondition: Option<String>,
    extras: BTreeMap<String, String>,
}

impl StageContext {
    pub fn new(
        unit: WorkUnit,
        stage_key: impl Into<String>,
        project_root: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            unit,
            stage_key: stage_key.into(),
            project_root: project_root.into(),
            output_dir: output_dir.into(),
            upstream_artifact: None,
            primary_config: None,
            precondition: None,
            extras: BTreeMap::new(),
        }
    }

    pub fn with_upstream_artifact(mut self, path: PathBuf) -> Self {
        self.upstream_artifact = Some(path);
        self
    }

    pub fn with_primary_config(mut self, path: PathBuf) -> Self {
        self.primary_config = Some(path);
        self
    }

    pub fn with_precondition(mut self, precondition: Option<String>) -> Self {
        self.precondition = precondition;
        self
    }

    /// Copy of this context with one more named value
    pub fn with_extra(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut augmented = self.clone();
        augmented.extras.insert(key.into(), value.into());
        augmented
    }

    pub fn unit(&self) -> &WorkUnit {
        &self.unit
    }

    pub fn stage_key(&self) -> &str {
        &self.stage_key
    }

    /// `out/<project>`
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The verified upstream artifact, or the unit's default artifact path
    pub fn input_file(&self) -> PathBuf {
        self.upstream_artifact
            .clone()
            .unwrap_or_else(|| self.unit.default_artifact())
    }

    pub fn primary_config(&self) -> Option<&Path> {
        self.primary_config.as_deref()
    }

    pub fn precondition(&self) -> Option<&str> {
        self.precondition.as_deref()
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extras.get(key).map(String::as_str)
    }

    /// Path as a string for embedding into commands
    pub fn display_path(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }
}
