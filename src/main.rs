use anyhow::{Context, Result};
use pipewright::cli::commands::{HistoryCommand, RunCommand, ValidateCommand, WatchCommand};
use pipewright::cli::output::{self, style, CHART, CHECK, CROSS, INFO};
use pipewright::cli::{Cli, Command};
use pipewright::core::config::PipelineConfig;
use pipewright::core::project::ProjectsConfig;
use pipewright::events::EventBroker;
use pipewright::execution::{run_pipeline_with_options, RunOptions};
use pipewright::persistence::{format_duration, RunStore, SqliteStore};
use pipewright::scheduler::Scheduler;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_command(cmd).await?,
        Command::Validate(cmd) => validate_command(cmd)?,
        Command::History(cmd) => history_command(cmd).await?,
        Command::Watch(cmd) => watch_command(cmd).await?,
    }

    Ok(())
}

async fn run_command(cmd: &RunCommand) -> Result<()> {
    let store: Option<Arc<dyn RunStore>> = if cmd.no_history {
        None
    } else {
        Some(Arc::new(SqliteStore::open_default().await?))
    };

    let options = RunOptions {
        store,
        stream_output: true,
        part_filter: cmd.part.clone(),
    };

    match run_pipeline_with_options(&cmd.file, options).await {
        Ok(result) => {
            if !result.run_ids.is_empty() {
                let ids = result
                    .run_ids
                    .iter()
                    .map(|id| format!("#{}", id))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("{} Recorded runs: {}", INFO, style(ids).dim());
            }
            println!(
                "\n{} Status: {} | Steps: {} | Duration: {}",
                CHART,
                style(result.status).green(),
                style(result.steps.len()).cyan(),
                style(format_duration(result.duration)).dim()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("\n{} {}", CROSS, style(&e).red());
            std::process::exit(1);
        }
    }
}

fn validate_command(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline definition...", INFO);

    match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => {
            let parts = config.all_parts();
            println!("{} Pipeline definition is valid!", CHECK);
            println!("  Parts: {}", style(parts.len()).cyan());
            for (name, steps) in &parts {
                println!("    {} ({} steps)", style(name).bold(), steps.len());
            }
            println!("  Schedules: {}", style(config.schedules.len()).cyan());
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}

async fn history_command(cmd: &HistoryCommand) -> Result<()> {
    let store = SqliteStore::open_default().await?;

    // A single run with its step executions
    if let Some(run_id) = cmd.run {
        let run = store.get_run(run_id).await?;
        println!("{}", output::format_run(&run));
        for step in &store.get_step_executions(run_id).await? {
            println!("  {}", output::format_step(step));
        }
        return Ok(());
    }

    // Latest runs per part of one project
    if let Some(project) = &cmd.project {
        let stats = store.get_latest_runs_by_part(project, cmd.limit).await?;
        if stats.is_empty() {
            println!("{} No runs found for project {}", INFO, style(project).bold());
            return Ok(());
        }
        for stat in &stats {
            println!("{}", output::format_part_stats(stat));
        }
        return Ok(());
    }

    let runs = store.get_runs(cmd.limit).await?;
    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }
    println!("{} Run history (latest {}):", INFO, cmd.limit);
    for run in &runs {
        println!("  {}", output::format_run(run));
    }
    Ok(())
}

async fn watch_command(cmd: &WatchCommand) -> Result<()> {
    let registry_path = PathBuf::from(&cmd.projects);
    let base_dir = match &cmd.base_dir {
        Some(dir) => PathBuf::from(dir),
        None => registry_dir(&registry_path),
    };

    let projects = ProjectsConfig::from_file(&registry_path)?;
    println!(
        "{} Watching {} project(s) from {}",
        INFO,
        style(projects.projects.len()).cyan(),
        style(registry_path.display()).bold()
    );
    for project in &projects.projects {
        if let Err(reason) = project.validate(&base_dir) {
            warn!("project {}: {}", project.name, reason);
        }
    }

    let store: Arc<dyn RunStore> = Arc::new(SqliteStore::open_default().await?);
    let broker = Arc::new(EventBroker::new());

    // Surface broadcast frames in the log for visibility
    let mut subscription = broker.subscribe();
    tokio::spawn(async move {
        while let Some(frame) = subscription.receiver.recv().await {
            debug!("event frame: {}", frame.trim_end());
        }
    });

    let scheduler = Arc::new(Scheduler::new(projects, store, broker, base_dir));
    let runner = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.run().await }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    println!("\n{} Shutting down after the current tick...", INFO);
    scheduler.stop();
    runner.await.context("Scheduler task panicked")?;

    Ok(())
}

fn registry_dir(registry_path: &Path) -> PathBuf {
    match registry_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
