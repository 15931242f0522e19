//! Work unit domain model and leaf manifest parsing

use crate::core::error::ManifestError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix every configuration directory carries
pub const CONFIG_DIR_PREFIX: &str = "config_";

/// Raw on-disk manifest. Both fields are required; they are optional here
/// only so a missing key can be reported by name.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Manifest {
    /// Path of the upstream data source
    #[serde(default)]
    pub tfile: Option<String>,

    /// Name of the data stream inside the source
    #[serde(default)]
    pub ttree: Option<String>,
}

impl Manifest {
    /// Read and validate a manifest file
    pub fn load(path: &Path) -> Result<(String, String), ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse manifest text, returning `(source_path, stream_name)`
    pub fn parse(content: &str, path: &Path) -> Result<(String, String), ManifestError> {
        let manifest: Manifest =
            serde_yaml::from_str(content).map_err(|source| ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let source_path = manifest
            .tfile
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ManifestError::MissingField {
                path: path.to_path_buf(),
                field: "tfile",
            })?;
        let stream_name = manifest
            .ttree
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ManifestError::MissingField {
                path: path.to_path_buf(),
                field: "ttree",
            })?;

        Ok((source_path, stream_name))
    }
}

/// One leaf of the discovered tree: `config_<NAME>/<pair>/<tag>/<manifest>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkUnit {
    /// Configuration name without the `config_` prefix
    pub config_name: String,

    /// The enclosing `config_<NAME>` directory
    pub config_dir: PathBuf,

    /// Name of the pair directory (parent of the leaf)
    pub pair_name: String,

    /// Name of the leaf directory
    pub tag: String,

    pub manifest_path: PathBuf,

    /// Upstream data source declared by the manifest
    pub source_path: PathBuf,

    /// Named stream inside the source
    pub stream_name: String,

    pub leaf_dir: PathBuf,
}

impl WorkUnit {
    /// Build a work unit from a manifest path, reading the manifest eagerly
    pub fn from_manifest(manifest_path: &Path) -> Result<Self, ManifestError> {
        let (source_path, stream_name) = Manifest::load(manifest_path)?;

        let leaf_dir = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let config_dir = ascend_to_config_dir(&leaf_dir)
            .ok_or_else(|| ManifestError::OutsideConfig(manifest_path.to_path_buf()))?;

        let config_name = file_name(&config_dir)
            .trim_start_matches(CONFIG_DIR_PREFIX)
            .to_string();
        let tag = file_name(&leaf_dir);
        let pair_name = leaf_dir.parent().map(file_name).unwrap_or_default();

        Ok(Self {
            config_name,
            config_dir,
            pair_name,
            tag,
            manifest_path: manifest_path.to_path_buf(),
            source_path: PathBuf::from(source_path),
            stream_name,
            leaf_dir,
        })
    }

    /// The configuration file co-named with the configuration directory
    pub fn primary_config(&self) -> PathBuf {
        self.config_dir.join(format!("{}.yaml", self.config_name))
    }

    /// File name of the declared source
    pub fn source_file_name(&self) -> String {
        file_name(&self.source_path)
    }

    /// Where the filtered copy of the source lands inside the leaf
    pub fn default_artifact(&self) -> PathBuf {
        self.leaf_dir.join(self.source_file_name())
    }

    /// Whether this leaf holds simulated data
    pub fn is_simulated(&self) -> bool {
        self.tag.contains("MC")
    }
}

/// Walk upwards from `dir` until a `config_*` directory is found
pub fn ascend_to_config_dir(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .find(|d| file_name(d).starts_with(CONFIG_DIR_PREFIX))
        .map(Path::to_path_buf)
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
