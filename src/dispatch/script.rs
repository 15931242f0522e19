//! Batch script rendering and submission-output parsing

use crate::core::{shell::quote_arg, JobRequest};
use regex::Regex;
use std::fmt::Write as _;
use std::path::Path;

/// Scheduler acknowledgement carrying the job id
pub const SUBMISSION_PATTERN: &str = r"Submitted batch job (\d+)";

/// A `#SBATCH` script for one job request
pub struct BatchScript<'a> {
    request: &'a JobRequest,
    workdir: &'a Path,
}

impl<'a> BatchScript<'a> {
    pub fn new(request: &'a JobRequest, workdir: &'a Path) -> Self {
        Self { request, workdir }
    }

    pub fn render(&self) -> String {
        let request = self.request;
        let profile = &request.profile;
        let mut script = String::from("#!/bin/bash\n");

        let mut directive = |line: String| {
            let _ = writeln!(script, "#SBATCH {}", line);
        };
        directive(format!("--job-name={}", request.job_name));
        directive(format!("--output={}", request.stdout_log().display()));
        directive(format!("--error={}", request.stderr_log().display()));
        directive(format!("--time={}", profile.walltime));
        directive(format!("--mem-per-cpu={}", profile.memory_per_cpu));
        directive(format!("--cpus-per-task={}", profile.cpu_count));
        if let Some(precondition) = &request.precondition {
            directive(format!("--dependency={}", precondition));
        }

        let _ = writeln!(script, "cd {}", quote_arg(&self.workdir.to_string_lossy()));
        let body: Vec<String> = request.commands.iter().map(|c| c.to_shell()).collect();
        script.push_str(&body.join("\n\n"));
        script.push('\n');
        script
    }
}

/// Job id from the scheduler's submission output, if it matches the pattern
pub fn extract_job_id(stdout: &str) -> Option<String> {
    let pattern = Regex::new(SUBMISSION_PATTERN).ok()?;
    pattern
        .captures(stdout)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
