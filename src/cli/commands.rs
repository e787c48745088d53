//! CLI command definitions

use clap::Args;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to the pipeline definition
    #[arg(short, long, default_value = "pipewright.yml")]
    pub file: String,

    /// Run only this part (qualified name, e.g. "frontend.deploy")
    #[arg(short, long)]
    pub part: Option<String>,

    /// Don't record the run in history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate a pipeline definition
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to the pipeline definition
    #[arg(short, long, default_value = "pipewright.yml")]
    pub file: String,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 20)]
    pub limit: i64,

    /// Show one run with its step executions
    #[arg(long)]
    pub run: Option<i64>,

    /// Show the latest runs per part for a project
    #[arg(long)]
    pub project: Option<String>,
}

/// Watch the project registry and fire schedules
#[derive(Debug, Args, Clone)]
pub struct WatchCommand {
    /// Path to the project registry
    #[arg(short = 'P', long, default_value = "projects.yml")]
    pub projects: String,

    /// Base directory for relative project paths; defaults to the
    /// registry file's directory
    #[arg(long)]
    pub base_dir: Option<String>,
}
