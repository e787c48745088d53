//! SQLite-backed run history

use crate::core::config::split_part_name;
use crate::persistence::{
    format_duration, PartRunStats, Run, RunStatus, RunStore, StepExecution, StorageError,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::Duration;

/// SQLite store for runs and step executions
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a database file
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Open the database at the default per-user data location
    pub async fn open_default() -> Result<Self, StorageError> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("pipewright");
        std::fs::create_dir_all(&db_dir)?;
        Self::new(db_dir.join("pipewright.db")).await
    }

    /// In-memory database, for tests and ephemeral use
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);
        // One pooled connection: each sqlite :memory: connection is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Create tables and indexes, then apply additive column migrations
    async fn init(&self) -> Result<(), StorageError> {
        let queries = [
            r#"CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                status TEXT NOT NULL,
                config_path TEXT NOT NULL,
                project_name TEXT NOT NULL DEFAULT '',
                "group" TEXT NOT NULL DEFAULT '',
                part TEXT NOT NULL DEFAULT 'default',
                started_at DATETIME NOT NULL,
                finished_at DATETIME,
                duration TEXT
            )"#,
            r#"CREATE TABLE IF NOT EXISTS step_executions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                command TEXT NOT NULL,
                output TEXT,
                "group" TEXT NOT NULL DEFAULT '',
                part TEXT NOT NULL DEFAULT 'default',
                category TEXT NOT NULL DEFAULT '',
                started_at DATETIME NOT NULL,
                finished_at DATETIME,
                duration TEXT,
                FOREIGN KEY(run_id) REFERENCES runs(id) ON DELETE CASCADE
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status)",
            "CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_step_executions_run_id ON step_executions(run_id)",
        ];
        for query in queries {
            sqlx::query(query).execute(&self.pool).await?;
        }

        // Columns added after the first schema version; defaults keep old rows valid
        self.ensure_column("runs", "project_name", "project_name TEXT NOT NULL DEFAULT ''")
            .await?;
        self.ensure_column("runs", "group", r#""group" TEXT NOT NULL DEFAULT ''"#)
            .await?;
        self.ensure_column("runs", "part", "part TEXT NOT NULL DEFAULT 'default'")
            .await?;
        self.ensure_column("step_executions", "group", r#""group" TEXT NOT NULL DEFAULT ''"#)
            .await?;
        self.ensure_column("step_executions", "part", "part TEXT NOT NULL DEFAULT 'default'")
            .await?;
        self.ensure_column(
            "step_executions",
            "category",
            "category TEXT NOT NULL DEFAULT ''",
        )
        .await?;

        Ok(())
    }

    async fn ensure_column(
        &self,
        table: &str,
        column: &str,
        definition: &str,
    ) -> Result<(), StorageError> {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
            .fetch_all(&self.pool)
            .await?;
        let exists = rows
            .iter()
            .any(|row| row.get::<String, _>("name") == column);
        if !exists {
            sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {}", table, definition))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn run_from_row(row: &SqliteRow) -> Run {
        Run {
            id: row.get("id"),
            status: RunStatus::from_db(&row.get::<String, _>("status")),
            config_path: row.get("config_path"),
            project: row.get("project_name"),
            group: row.get("group"),
            part: row.get("part"),
            started_at: Self::from_naive(row.get("started_at")),
            finished_at: row
                .get::<Option<NaiveDateTime>, _>("finished_at")
                .map(Self::from_naive),
            duration: row.get("duration"),
        }
    }

    fn step_from_row(row: &SqliteRow) -> StepExecution {
        StepExecution {
            id: row.get("id"),
            run_id: row.get("run_id"),
            name: row.get("name"),
            status: RunStatus::from_db(&row.get::<String, _>("status")),
            command: row.get("command"),
            output: row.get::<Option<String>, _>("output").unwrap_or_default(),
            group: row.get("group"),
            part: row.get("part"),
            category: row.get("category"),
            started_at: Self::from_naive(row.get("started_at")),
            finished_at: row
                .get::<Option<NaiveDateTime>, _>("finished_at")
                .map(Self::from_naive),
            duration: row.get("duration"),
        }
    }
}

#[async_trait::async_trait]
impl RunStore for SqliteStore {
    async fn create_run(
        &self,
        config_path: &str,
        project: &str,
        part: &str,
    ) -> Result<Run, StorageError> {
        let (group, part_name) = split_part_name(part);
        let now = Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO runs (status, config_path, project_name, "group", part, started_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        )
        .bind(RunStatus::Running.as_str())
        .bind(config_path)
        .bind(project)
        .bind(group)
        .bind(part_name)
        .bind(Self::to_naive(now))
        .execute(&self.pool)
        .await?;

        Ok(Run {
            id: result.last_insert_rowid(),
            status: RunStatus::Running,
            config_path: config_path.to_string(),
            project: project.to_string(),
            group: group.to_string(),
            part: part_name.to_string(),
            started_at: now,
            finished_at: None,
            duration: None,
        })
    }

    async fn update_run_status(
        &self,
        run_id: i64,
        status: RunStatus,
        duration: Duration,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE runs SET status = ?1, finished_at = ?2, duration = ?3 WHERE id = ?4")
            .bind(status.as_str())
            .bind(Self::to_naive(Utc::now()))
            .bind(format_duration(duration))
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_runs(&self, limit: i64) -> Result<Vec<Run>, StorageError> {
        let rows = sqlx::query(
            r#"SELECT id, status, config_path, project_name, "group", part, started_at, finished_at, duration
               FROM runs ORDER BY started_at DESC, id DESC LIMIT ?1"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::run_from_row).collect())
    }

    async fn get_run(&self, run_id: i64) -> Result<Run, StorageError> {
        let row = sqlx::query(
            r#"SELECT id, status, config_path, project_name, "group", part, started_at, finished_at, duration
               FROM runs WHERE id = ?1"#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Self::run_from_row(&row)),
            None => Err(StorageError::RunNotFound(run_id)),
        }
    }

    async fn create_step_execution(
        &self,
        run_id: i64,
        name: &str,
        command: &str,
        part: &str,
        category: &str,
    ) -> Result<StepExecution, StorageError> {
        let (group, part_name) = split_part_name(part);
        let now = Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO step_executions (run_id, name, status, command, "group", part, category, started_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
        )
        .bind(run_id)
        .bind(name)
        .bind(RunStatus::Running.as_str())
        .bind(command)
        .bind(group)
        .bind(part_name)
        .bind(category)
        .bind(Self::to_naive(now))
        .execute(&self.pool)
        .await?;

        Ok(StepExecution {
            id: result.last_insert_rowid(),
            run_id,
            name: name.to_string(),
            status: RunStatus::Running,
            command: command.to_string(),
            output: String::new(),
            group: group.to_string(),
            part: part_name.to_string(),
            category: category.to_string(),
            started_at: now,
            finished_at: None,
            duration: None,
        })
    }

    async fn update_step_execution(
        &self,
        step_id: i64,
        status: RunStatus,
        output: &str,
        duration: Duration,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE step_executions SET status = ?1, output = ?2, finished_at = ?3, duration = ?4 WHERE id = ?5",
        )
        .bind(status.as_str())
        .bind(output)
        .bind(Self::to_naive(Utc::now()))
        .bind(format_duration(duration))
        .bind(step_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_step_executions(&self, run_id: i64) -> Result<Vec<StepExecution>, StorageError> {
        let rows = sqlx::query(
            r#"SELECT id, run_id, name, status, command, output, "group", part, category, started_at, finished_at, duration
               FROM step_executions WHERE run_id = ?1 ORDER BY id ASC"#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::step_from_row).collect())
    }

    async fn get_latest_runs_by_part(
        &self,
        project: &str,
        limit_per_part: i64,
    ) -> Result<Vec<PartRunStats>, StorageError> {
        let rows = sqlx::query(
            r#"SELECT r."group", r.part, r.id, r.status, r.duration, r.started_at,
                      COUNT(se.id) AS step_count
               FROM runs r
               LEFT JOIN step_executions se ON r.id = se.run_id
               WHERE r.project_name = ?1
               GROUP BY r.id, r."group", r.part, r.status, r.duration, r.started_at
               ORDER BY r."group", r.part, r.started_at DESC, r.id DESC"#,
        )
        .bind(project)
        .fetch_all(&self.pool)
        .await?;

        let mut counts: std::collections::HashMap<(String, String), i64> =
            std::collections::HashMap::new();
        let mut stats = Vec::new();
        for row in &rows {
            let group: String = row.get("group");
            let part: String = row.get("part");
            let seen = counts.entry((group.clone(), part.clone())).or_insert(0);
            if *seen >= limit_per_part {
                continue;
            }
            *seen += 1;

            stats.push(PartRunStats {
                group,
                part,
                run_id: row.get("id"),
                status: RunStatus::from_db(&row.get::<String, _>("status")),
                duration: row.get("duration"),
                started_at: Self::from_naive(row.get("started_at")),
                step_count: row.get("step_count"),
            });
        }

        Ok(stats)
    }
}
