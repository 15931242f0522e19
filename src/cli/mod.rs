//! Command-line interface

pub mod output;

use crate::core::config::Settings;
use crate::core::DispatchMode;
use crate::dispatch::RunOptions;
use crate::stage::StageOptions;
use anyhow::{Context, Result};
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Multi-stage batch pipeline orchestrator
#[derive(Debug, Parser, Clone)]
#[command(name = "batchflow")]
#[command(version)]
#[command(about = "Run a staged analysis pipeline over a work-unit tree", long_about = None)]
pub struct Cli {
    /// Project name; the tree lives in <output_base>/<project>
    pub project: String,

    /// Pipeline specification (YAML)
    pub pipeline: PathBuf,

    /// Configuration files; each becomes a config_<stem> directory and a filter token
    pub configs: Vec<PathBuf>,

    /// Keep the existing tree: no config re-copy, no tree-repopulating stages
    #[arg(long)]
    pub append: bool,

    /// Entry limit passed to the filter stage (-1 = all)
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub max_entries: i64,

    /// Keep at most this many work units per configuration
    #[arg(long)]
    pub max_files: Option<usize>,

    /// Submit batch jobs instead of running locally
    #[arg(long)]
    pub cluster: bool,

    /// Ignore stage selection predicates and the configuration filter
    #[arg(long)]
    pub all: bool,

    /// Block on upstream cluster jobs before every stage
    #[arg(long)]
    pub wait: bool,

    /// Abort the run at the first failed dispatch
    #[arg(long)]
    pub fail_fast: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            mode: mode(self.cluster),
            append: self.append,
            all: self.all,
            fail_fast: self.fail_fast,
            wait: self.wait,
            config_filter: filter_tokens(&self.configs),
            max_per_config: self.max_files,
        }
    }

    pub fn stage_options(&self, settings: &Settings) -> StageOptions {
        StageOptions {
            compute: settings.compute.clone(),
            max_entries: entry_limit(self.max_entries),
            ..StageOptions::default()
        }
    }
}

/// Run a single stage over the work-unit tree
#[derive(Debug, Parser, Clone)]
#[command(name = "batchflow-stage")]
#[command(version)]
#[command(about = "Run one pipeline stage and report submitted job ids", long_about = None)]
pub struct StageCli {
    /// Stage key, e.g. filterTree or asymmetry
    pub stage: String,

    /// Project name; the tree lives in <output_base>/<project>
    pub project: String,

    /// Configuration filter tokens (names or config file paths)
    pub configs: Vec<String>,

    /// Submit batch jobs instead of running locally
    #[arg(long)]
    pub cluster: bool,

    /// Scheduler precondition for every submission, e.g. afterok:12:13
    #[arg(long)]
    pub dependency: Option<String>,

    /// Entry limit passed to the filter stage (-1 = all)
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub max_entries: i64,

    /// Keep at most this many work units per configuration
    #[arg(long)]
    pub max_files: Option<usize>,

    /// Injection jobs per data leaf
    #[arg(long, default_value_t = 4)]
    pub jobs: usize,

    /// Injection trials inside each job
    #[arg(long, alias = "trials-per-job", default_value_t = 3)]
    pub per_job: usize,

    /// Ignore the stage selection predicate and the configuration filter
    #[arg(long)]
    pub all: bool,

    /// Orchestrator settings (YAML)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl StageCli {
    pub fn from_args() -> Self {
        Self::parse()
    }

    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    pub fn load_settings(&self) -> Result<Settings> {
        match &self.settings {
            Some(path) => Settings::from_file(path)
                .with_context(|| format!("Failed to load settings from {}", path.display())),
            None => Ok(Settings::default()),
        }
    }

    pub fn mode(&self) -> DispatchMode {
        mode(self.cluster)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            mode: self.mode(),
            all: self.all,
            config_filter: self.configs.clone(),
            max_per_config: self.max_files,
            ..RunOptions::default()
        }
    }

    pub fn stage_options(&self, settings: &Settings) -> StageOptions {
        StageOptions {
            compute: settings.compute.clone(),
            max_entries: entry_limit(self.max_entries),
            injection_jobs: self.jobs,
            injection_per_job: self.per_job,
        }
    }
}

fn mode(cluster: bool) -> DispatchMode {
    if cluster {
        DispatchMode::Cluster
    } else {
        DispatchMode::Local
    }
}

/// Any non-positive limit means every entry
fn entry_limit(max_entries: i64) -> i64 {
    if max_entries > 0 {
        max_entries
    } else {
        -1
    }
}

fn filter_tokens(configs: &[PathBuf]) -> Vec<String> {
    configs
        .iter()
        .map(|c| c.to_string_lossy().into_owned())
        .collect()
}

/// Install the stderr log subscriber; `RUST_LOG` overrides the level
pub fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")
}
