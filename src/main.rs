use anyhow::{Context, Result};
use batchflow::cli::output::{format_run_summary, style, ConsoleReporter, CROSS, INFO};
use batchflow::cli::{init_logging, Cli};
use batchflow::core::config::PipelineConfig;
use batchflow::core::ExecutionStatus;
use batchflow::{OrchestratorError, PipelineCoordinator, SlurmScheduler, SubprocessRunner};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}{:#}", CROSS, style(e).red());
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::from_args();
    init_logging(cli.verbose)?;

    let pipeline = PipelineConfig::from_file(&cli.pipeline)
        .with_context(|| format!("Failed to load pipeline {}", cli.pipeline.display()))?;
    let settings = pipeline.settings.clone();
    let workdir = std::env::current_dir().context("Failed to resolve working directory")?;

    if !cli.json {
        println!(
            "{} Loaded pipeline {} ({} stages)",
            INFO,
            style(pipeline.name.as_deref().unwrap_or(&cli.project)).bold(),
            pipeline.stages.len()
        );
    }

    let mut coordinator = PipelineCoordinator::new(
        cli.project.clone(),
        settings.clone(),
        Arc::new(SubprocessRunner::new()),
        Arc::new(SlurmScheduler::new(&settings.scheduler)),
    )
    .with_options(cli.run_options())
    .with_stage_options(cli.stage_options(&settings))
    .with_workdir(workdir);

    let reporter = Arc::new(ConsoleReporter::new());
    let json = cli.json;
    coordinator.add_event_handler(move |event| {
        if !json {
            reporter.handle(&event);
        }
    });

    coordinator
        .install_configs(&cli.configs)
        .context("Failed to install configuration files")?;

    let report = coordinator.run(&pipeline).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("\n{}", format_run_summary(&report));
        let jobs = report.cluster_jobs();
        if !jobs.is_empty() {
            println!("{}", jobs.report_line());
        }
    }

    if report.status == ExecutionStatus::Failed {
        let (stage, tag) = report.aborted_at().unwrap_or(("?", "?"));
        return Err(OrchestratorError::Aborted {
            stage: stage.to_string(),
            tag: tag.to_string(),
        }
        .into());
    }

    Ok(())
}
