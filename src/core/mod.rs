//! Core domain models
//!
//! Work units and their discovery, stage contexts, jobs, dependency sets,
//! run state and the pipeline specification.

pub mod config;
pub mod context;
pub mod dependency;
pub mod discovery;
pub mod error;
pub mod job;
pub mod shell;
pub mod state;
pub mod work_unit;

pub use context::*;
pub use dependency::DependencySet;
pub use error::*;
pub use job::*;
pub use state::*;
pub use work_unit::WorkUnit;
