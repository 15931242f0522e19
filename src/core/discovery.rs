//! Work-unit tree walker
//!
//! Discovery is pure: it only reads the filesystem and always reflects its
//! current state, so it can be called once per stage.

use crate::core::{
    error::OrchestratorError,
    work_unit::{file_name, WorkUnit, CONFIG_DIR_PREFIX},
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Options controlling which leaves are returned
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// Configuration filter tokens; empty means every configuration
    pub config_filter: Vec<String>,

    /// Manifest file name looked up in each leaf
    pub manifest_name: String,

    /// Keep at most this many units per configuration
    pub max_per_config: Option<usize>,
}

impl DiscoveryOptions {
    pub fn new(manifest_name: impl Into<String>) -> Self {
        Self {
            manifest_name: manifest_name.into(),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, tokens: &[String]) -> Self {
        self.config_filter = tokens.iter().map(|t| normalize_filter_token(t)).collect();
        self
    }

    pub fn with_max_per_config(mut self, max: Option<usize>) -> Self {
        self.max_per_config = max.filter(|m| *m > 0);
        self
    }

    /// Whether a configuration directory passes the filter
    pub fn accepts_config(&self, config_dir_name: &str) -> bool {
        self.config_filter.is_empty()
            || self
                .config_filter
                .iter()
                .any(|token| config_dir_name.contains(token.as_str()))
    }
}

/// Turn `configs/nominal.yaml` into `config_nominal`; bare names get the prefix too
pub fn normalize_filter_token(token: &str) -> String {
    let stem = Path::new(token)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| token.to_string());
    if stem.starts_with(CONFIG_DIR_PREFIX) {
        stem
    } else {
        format!("{}{}", CONFIG_DIR_PREFIX, stem)
    }
}

/// Find every manifest under `root/config_*/**/` and return the work units in
/// lexicographic order of their manifest paths.
///
/// Only a missing root is fatal. Unreadable or incomplete manifests are
/// logged and skipped.
pub fn discover(root: &Path, options: &DiscoveryOptions) -> Result<Vec<WorkUnit>, OrchestratorError> {
    if !root.is_dir() {
        return Err(OrchestratorError::MissingRoot(root.to_path_buf()));
    }

    let mut manifests = manifest_paths(root, &options.manifest_name);
    manifests.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));

    let mut per_config: HashMap<PathBuf, usize> = HashMap::new();
    let mut units = Vec::with_capacity(manifests.len());

    for manifest in manifests {
        let unit = match WorkUnit::from_manifest(&manifest) {
            Ok(unit) => unit,
            Err(e) => {
                warn!(manifest = %manifest.display(), "skipping leaf: {}", e);
                continue;
            }
        };

        if !options.accepts_config(&file_name(&unit.config_dir)) {
            continue;
        }

        let seen = per_config.entry(unit.config_dir.clone()).or_insert(0);
        if options.max_per_config.is_some_and(|max| *seen >= max) {
            debug!(tag = %unit.tag, "max units reached for {}", unit.config_name);
            continue;
        }
        *seen += 1;

        units.push(unit);
    }

    debug!("discovered {} work units under {}", units.len(), root.display());
    Ok(units)
}

fn manifest_paths(root: &Path, manifest_name: &str) -> Vec<PathBuf> {
    let pattern = format!(
        "{}/{}*/**/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        CONFIG_DIR_PREFIX,
        glob::Pattern::escape(manifest_name)
    );

    match glob::glob(&pattern) {
        Ok(paths) => paths
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("unreadable path during discovery: {}", e);
                    None
                }
            })
            .filter(|p| p.is_file())
            .collect(),
        Err(e) => {
            warn!("invalid discovery pattern {}: {}", pattern, e);
            Vec::new()
        }
    }
}
