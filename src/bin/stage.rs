use anyhow::{Context, Result};
use batchflow::cli::output::{format_stage_report, style, ConsoleReporter, CROSS};
use batchflow::cli::{init_logging, StageCli};
use batchflow::core::StageStatus;
use batchflow::{create_stage, OrchestratorError, PipelineCoordinator, SlurmScheduler, SubprocessRunner};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}{:#}", CROSS, style(e).red());
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = StageCli::from_args();
    init_logging(cli.verbose)?;

    let settings = cli.load_settings()?;
    let stage_options = cli.stage_options(&settings);
    let stage = create_stage(&cli.stage, &stage_options)
        .ok_or_else(|| OrchestratorError::UnknownStage(cli.stage.clone()))?;
    let workdir = std::env::current_dir().context("Failed to resolve working directory")?;

    let mut coordinator = PipelineCoordinator::new(
        cli.project.clone(),
        settings.clone(),
        Arc::new(SubprocessRunner::new()),
        Arc::new(SlurmScheduler::new(&settings.scheduler)),
    )
    .with_options(cli.run_options())
    .with_stage_options(stage_options)
    .with_workdir(workdir);

    let reporter = Arc::new(ConsoleReporter::new());
    coordinator.add_event_handler(move |event| reporter.handle(&event));

    let report = coordinator
        .run_stage(stage.as_ref(), cli.mode(), cli.dependency.clone())
        .await?;
    println!("{}", format_stage_report(&report));

    if !report.dependencies.is_empty() {
        println!("{}", report.dependencies.report_line());
    }

    if let StageStatus::Aborted { tag } = &report.status {
        return Err(OrchestratorError::Aborted {
            stage: report.stage.clone(),
            tag: tag.clone(),
        }
        .into());
    }

    Ok(())
}
