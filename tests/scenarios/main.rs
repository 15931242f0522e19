//! Scenario-based tests for batchflow

mod helpers;

mod dependency_chain;
mod discovery;
mod local_execution;
