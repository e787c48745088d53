//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, RunCommand, ValidateCommand, WatchCommand};

/// Scheduled command pipeline runner
#[derive(Debug, Parser, Clone)]
#[command(name = "pipewright")]
#[command(author = "Pipewright Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Run multi-step command pipelines on demand or on a schedule", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline
    Run(RunCommand),

    /// Validate a pipeline definition
    Validate(ValidateCommand),

    /// Show run history
    History(HistoryCommand),

    /// Watch the project registry and fire schedules
    Watch(WatchCommand),
}

impl Cli {
    /// Parse CLI arguments from the environment
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
}

use std::ffi::OsString;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_part() {
        let cli = Cli::try_parse_from(["pipewright", "run", "-f", "ci.yml", "--part", "web.build"])
            .unwrap();
        match cli.command {
            Command::Run(cmd) => {
                assert_eq!(cmd.file, "ci.yml");
                assert_eq!(cmd.part.as_deref(), Some("web.build"));
                assert!(!cmd.no_history);
            }
            other => panic!("expected run command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_watch_defaults() {
        let cli = Cli::try_parse_from(["pipewright", "watch"]).unwrap();
        match cli.command {
            Command::Watch(cmd) => {
                assert_eq!(cmd.projects, "projects.yml");
                assert!(cmd.base_dir.is_none());
            }
            other => panic!("expected watch command, got {:?}", other),
        }
    }
}
