//! Error taxonomy for the orchestrator
//!
//! Only [`OrchestratorError`] aborts a run. Everything else is scoped to a
//! single work unit or a single dispatch and is logged and counted.

use std::path::PathBuf;
use thiserror::Error;

/// Structural errors that abort the whole run
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("output root '{0}' does not exist")]
    MissingRoot(PathBuf),

    #[error("invalid pipeline specification: {0}")]
    InvalidPipelineSpec(String),

    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    #[error("run aborted after failure in stage '{stage}' for '{tag}'")]
    Aborted { stage: String, tag: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OrchestratorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure to read a single leaf manifest
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("manifest {path} is missing required field '{field}'")]
    MissingField { path: PathBuf, field: &'static str },

    #[error("manifest {0} does not sit inside a config_* directory")]
    OutsideConfig(PathBuf),
}

/// Why a work unit was excluded from a stage
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("upstream artifact not found: {0}")]
    MissingUpstreamArtifact(PathBuf),

    #[error("primary config not found: {0}")]
    MissingPrimaryConfig(PathBuf),

    #[error("no simulated counterpart mapped for tag '{0}'")]
    NoCounterpart(String),

    #[error("counterpart input missing: {0}")]
    MissingCounterpartInput(PathBuf),

    #[error("cannot prepare output directory {path}: {message}")]
    OutputDir { path: PathBuf, message: String },
}
