//! Persistence layer for run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors from the persistence store
#[derive(Debug, Error)]
pub enum StorageError {
    #[cfg(feature = "sqlite")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("run {0} not found")]
    RunNotFound(i64),
}

/// Status of a run or step execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    /// Lenient decode for database text columns
    pub fn from_db(s: &str) -> Self {
        match s {
            "success" => RunStatus::Success,
            "failed" => RunStatus::Failed,
            _ => RunStatus::Running,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted execution attempt of a part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub status: RunStatus,
    pub config_path: String,
    pub project: String,
    /// Group name, empty for ungrouped parts
    pub group: String,
    pub part: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration: Option<String>,
}

/// One persisted execution attempt of a single step within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: i64,
    pub run_id: i64,
    pub name: String,
    pub status: RunStatus,
    pub command: String,
    pub output: String,
    pub group: String,
    pub part: String,
    pub category: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration: Option<String>,
}

/// Latest-run summary for one part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartRunStats {
    pub group: String,
    pub part: String,
    pub run_id: i64,
    pub status: RunStatus,
    pub duration: Option<String>,
    pub started_at: DateTime<Utc>,
    pub step_count: i64,
}

/// Trait for run-history stores
///
/// Runs are created at start (status `running`) and finalized exactly once
/// by the caller; the store does not guard against double-finalization.
#[async_trait::async_trait]
pub trait RunStore: Send + Sync {
    /// Create a run with status `running`; `part` is the qualified name
    async fn create_run(
        &self,
        config_path: &str,
        project: &str,
        part: &str,
    ) -> Result<Run, StorageError>;

    /// Set terminal status, finish time and duration of a run
    async fn update_run_status(
        &self,
        run_id: i64,
        status: RunStatus,
        duration: Duration,
    ) -> Result<(), StorageError>;

    /// Most-recent-first runs
    async fn get_runs(&self, limit: i64) -> Result<Vec<Run>, StorageError>;

    async fn get_run(&self, run_id: i64) -> Result<Run, StorageError>;

    /// Create a step execution with status `running`
    async fn create_step_execution(
        &self,
        run_id: i64,
        name: &str,
        command: &str,
        part: &str,
        category: &str,
    ) -> Result<StepExecution, StorageError>;

    async fn update_step_execution(
        &self,
        step_id: i64,
        status: RunStatus,
        output: &str,
        duration: Duration,
    ) -> Result<(), StorageError>;

    /// Step executions of one run, ordered by creation id ascending
    async fn get_step_executions(&self, run_id: i64) -> Result<Vec<StepExecution>, StorageError>;

    /// Per distinct (group, part): at most `limit_per_part` most-recent
    /// runs with step counts, ordered by group, part, recency
    async fn get_latest_runs_by_part(
        &self,
        project: &str,
        limit_per_part: i64,
    ) -> Result<Vec<PartRunStats>, StorageError>;
}

/// Human-readable duration, e.g. "250ms", "1m 5s"
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
