//! CLI output formatting

use crate::core::{ExecutionStatus, JobState, RunReport, StageReport, StageStatus};
use crate::dispatch::PipelineEvent;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Spinner shown while blocking on cluster jobs
pub fn create_wait_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(spinner_style) =
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
    {
        spinner.set_style(spinner_style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// One-line stage summary
pub fn format_stage_report(report: &StageReport) -> String {
    let icon = match &report.status {
        StageStatus::Completed if report.failed == 0 => CHECK,
        StageStatus::Completed => WARN,
        StageStatus::Unknown | StageStatus::Skipped { .. } => INFO,
        StageStatus::Aborted { .. } => CROSS,
    };

    let mut line = format!(
        "{} {} [{}] {} ok, {} submitted, {} failed, {} skipped",
        icon,
        style(&report.stage).bold(),
        report.mode,
        style(report.succeeded).green(),
        style(report.submitted).cyan(),
        style(report.failed).red(),
        style(report.skipped).dim()
    );
    match &report.status {
        StageStatus::Skipped { reason } => {
            line.push_str(&format!(" ({})", style(reason).dim()));
        }
        StageStatus::Unknown => line.push_str(&format!(" ({})", style("unknown stage").dim())),
        _ => {}
    }
    if !report.dependencies.is_empty() {
        line.push_str(&format!(
            " -> {}",
            style(report.dependencies.ids().join(",")).dim()
        ));
    }
    line
}

/// Format a pipeline event for display; `None` for events shown elsewhere
pub fn format_pipeline_event(event: &PipelineEvent) -> Option<String> {
    let line = match event {
        PipelineEvent::RunStarted {
            run_id,
            project,
            stages,
        } => format!(
            "{} Starting {} ({} stages, run {})",
            ROCKET,
            style(project).bold(),
            stages,
            style(&run_id.to_string()[..8]).dim()
        ),
        PipelineEvent::StageStarted {
            stage,
            mode,
            precondition,
        } => match precondition {
            Some(precondition) => format!(
                "{} {} [{}] after {}",
                SPINNER,
                style(stage).cyan(),
                mode,
                style(precondition).dim()
            ),
            None => format!("{} {} [{}]", SPINNER, style(stage).cyan(), mode),
        },
        PipelineEvent::StageUnknown { stage } => {
            format!("{} Unknown stage {}, skipping", WARN, style(stage).yellow())
        }
        PipelineEvent::StageSkipped { stage, reason } => format!(
            "{} Skipping {}: {}",
            WARN,
            style(stage).yellow(),
            style(reason).dim()
        ),
        PipelineEvent::UnitSkipped { stage, tag, reason } => format!(
            "  {} [{}][{}] {}",
            WARN,
            stage,
            tag,
            style(reason).dim()
        ),
        PipelineEvent::JobFinished { stage, job } => match &job.state {
            JobState::Succeeded { .. } => format!("  {} [{}][{}]", CHECK, stage, job.tag),
            JobState::Submitted { job_id, .. } => format!(
                "  {} [{}][{}] job {}",
                INFO,
                stage,
                job.tag,
                style(job_id).cyan()
            ),
            JobState::Failed { error, .. } => format!(
                "  {} [{}][{}] {}",
                CROSS,
                stage,
                job.tag,
                style(error).red()
            ),
            _ => return None,
        },
        PipelineEvent::ExternalOutput { output, .. } => output.trim_end().to_string(),
        PipelineEvent::WaitingForJobs { .. } => return None,
        PipelineEvent::StageCompleted { report } => format_stage_report(report),
        PipelineEvent::RunCompleted { status, .. } => {
            format!("{} Run {}", INFO, format_status(*status))
        }
    };
    Some(line)
}

/// Renders events to stdout, with a spinner while waiting on the cluster
#[derive(Default)]
pub struct ConsoleReporter {
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, event: &PipelineEvent) {
        if let PipelineEvent::WaitingForJobs { stage, remaining } = event {
            if let Ok(mut spinner) = self.spinner.lock() {
                spinner
                    .get_or_insert_with(create_wait_spinner)
                    .set_message(format!("{} waiting for {} cluster jobs", stage, remaining));
            }
            return;
        }

        if let Ok(mut spinner) = self.spinner.lock() {
            if let Some(spinner) = spinner.take() {
                spinner.finish_and_clear();
            }
        }

        if let Some(line) = format_pipeline_event(event) {
            println!("{}", line);
        }
    }
}

/// Final summary after a coordinator run
pub fn format_run_summary(report: &RunReport) -> String {
    let icon = match report.status {
        ExecutionStatus::Completed if report.total_failed() == 0 => CHECK,
        ExecutionStatus::Completed => WARN,
        ExecutionStatus::Failed => CROSS,
        _ => INFO,
    };
    format!(
        "{} {} {}: {} jobs dispatched, {} failed",
        icon,
        style(&report.project).bold(),
        format_status(report.status),
        report.total_dispatched(),
        report.total_failed()
    )
}
