//! Sequential execution of pipeline parts as shell subprocesses

use crate::cli::output::{style, ARROW, CHECK, CROSS, FINISH, PACKAGE};
use crate::core::config::{ConfigError, PipelineConfig, Step};
use crate::persistence::{RunStatus, RunStore, StorageError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{error, info};

/// Errors from a pipeline invocation
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A step exited non-zero or failed to launch. Carries everything
    /// executed up to and including the failing step.
    #[error("step '{step}' failed: {reason}")]
    StepFailed {
        step: String,
        reason: String,
        result: PipelineResult,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// How to run a pipeline
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Optional store for durable run history
    pub store: Option<Arc<dyn RunStore>>,

    /// Mirror subprocess output live to the console
    pub stream_output: bool,

    /// Run only this part (qualified name); None runs all parts
    pub part_filter: Option<String>,
}

/// Outcome of one executed step
#[derive(Debug, Clone)]
pub struct StepResult {
    pub name: String,
    pub status: RunStatus,
    pub output: String,
    pub duration: Duration,
    pub error: Option<String>,
}

/// Outcome of a pipeline invocation
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub status: RunStatus,
    /// Ids of the runs created for each executed part, in order
    pub run_ids: Vec<i64>,
    pub steps: Vec<StepResult>,
    pub duration: Duration,
}

/// Run a pipeline with console streaming and no persistence
pub async fn run_pipeline<P: AsRef<Path>>(config_path: P) -> Result<PipelineResult, PipelineError> {
    run_pipeline_with_options(
        config_path,
        RunOptions {
            stream_output: true,
            ..Default::default()
        },
    )
    .await
}

/// Run a pipeline's parts sequentially, each step as a `sh -c` subprocess
///
/// Parts execute in qualified-name order. Every subprocess runs with the
/// definition file's directory as its working directory; the process-wide
/// working directory is never touched. The first failing step aborts the
/// remaining steps and parts of this invocation.
pub async fn run_pipeline_with_options<P: AsRef<Path>>(
    config_path: P,
    options: RunOptions,
) -> Result<PipelineResult, PipelineError> {
    let started = Instant::now();
    let config_path = config_path.as_ref();
    let config = PipelineConfig::from_file(config_path)?;

    let config_dir = config_dir_of(config_path);
    let project = config_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let config_path_str = config_path.to_string_lossy().into_owned();

    let mut parts = config.all_parts();
    if let Some(filter) = &options.part_filter {
        let steps = parts
            .remove(filter)
            .ok_or_else(|| ConfigError::PartNotFound(filter.clone()))?;
        parts = BTreeMap::from([(filter.clone(), steps)]);
    }

    let mut result = PipelineResult {
        status: RunStatus::Running,
        run_ids: Vec::new(),
        steps: Vec::new(),
        duration: Duration::ZERO,
    };

    for (part_name, steps) in &parts {
        if options.stream_output && part_name != "default" {
            println!("\n{} Part: {}", PACKAGE, style(part_name).bold());
        }
        info!("running part '{}' ({} steps)", part_name, steps.len());

        let run_id = match &options.store {
            Some(store) => {
                let run = store
                    .create_run(&config_path_str, &project, part_name)
                    .await?;
                result.run_ids.push(run.id);
                Some(run.id)
            }
            None => None,
        };

        for step in steps {
            let step_result =
                execute_step(step, part_name, run_id, &config_dir, &options).await?;
            let failed = step_result.error.clone();
            result.steps.push(step_result);

            if let Some(reason) = failed {
                let step_name = step.name.clone();
                error!("step '{}' failed: {}", step_name, reason);

                result.status = RunStatus::Failed;
                result.duration = started.elapsed();
                if let (Some(store), Some(run_id)) = (&options.store, run_id) {
                    store
                        .update_run_status(run_id, RunStatus::Failed, started.elapsed())
                        .await?;
                }
                return Err(PipelineError::StepFailed {
                    step: step_name,
                    reason,
                    result,
                });
            }
        }

        if let (Some(store), Some(run_id)) = (&options.store, run_id) {
            store
                .update_run_status(run_id, RunStatus::Success, started.elapsed())
                .await?;
        }
    }

    result.status = RunStatus::Success;
    result.duration = started.elapsed();

    if options.stream_output {
        println!("\n{} All steps finished successfully.", FINISH);
    }

    Ok(result)
}

fn config_dir_of(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn execute_step(
    step: &Step,
    part_name: &str,
    run_id: Option<i64>,
    working_dir: &Path,
    options: &RunOptions,
) -> Result<StepResult, PipelineError> {
    let step_started = Instant::now();

    if options.stream_output {
        println!("{} {}", ARROW, style(&step.name).cyan());
    }

    let step_exec_id = match (&options.store, run_id) {
        (Some(store), Some(run_id)) => {
            let exec = store
                .create_step_execution(
                    run_id,
                    &step.name,
                    &step.run,
                    part_name,
                    step.category.as_deref().unwrap_or(""),
                )
                .await?;
            Some(exec.id)
        }
        _ => None,
    };

    let (output, error) = run_shell_command(&step.run, working_dir, options.stream_output).await;
    let duration = step_started.elapsed();

    let status = if error.is_none() {
        RunStatus::Success
    } else {
        RunStatus::Failed
    };

    if let (Some(store), Some(exec_id)) = (&options.store, step_exec_id) {
        store
            .update_step_execution(exec_id, status, &output, duration)
            .await?;
    }

    if options.stream_output {
        match &error {
            None => println!("{} Done: {}", CHECK, style(&step.name).green()),
            Some(reason) => println!("{} Step failed: {}", CROSS, style(reason).red()),
        }
    }

    Ok(StepResult {
        name: step.name.clone(),
        status,
        output,
        duration,
        error,
    })
}

/// Run a command through the shell, capturing combined stdout + stderr
///
/// Returns the captured text (stdout first, then stderr, with a trailing
/// newline appended if the text is non-empty and lacks one) and the
/// failure reason, if any.
async fn run_shell_command(
    command: &str,
    working_dir: &Path,
    stream_output: bool,
) -> (String, Option<String>) {
    let mut child = match Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return (String::new(), Some(format!("failed to launch command: {}", e))),
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_task = tokio::spawn(drain(stdout, stream_output, false));
    let stderr_task = tokio::spawn(drain(stderr, stream_output, true));

    let status = child.wait().await;
    let stdout_text = stdout_task.await.unwrap_or_default();
    let stderr_text = stderr_task.await.unwrap_or_default();

    let mut combined = stdout_text;
    combined.push_str(&stderr_text);
    if !combined.is_empty() && !combined.ends_with('\n') {
        combined.push('\n');
    }

    match status {
        Ok(status) if status.success() => (combined, None),
        Ok(status) => {
            let reason = match status.code() {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            };
            (combined, Some(reason))
        }
        Err(e) => (combined, Some(format!("failed to wait for command: {}", e))),
    }
}

/// Collect a child stream to a string, optionally mirroring the bytes live
async fn drain<R>(reader: Option<R>, mirror: bool, to_stderr: bool) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return String::new();
    };

    let mut buf = [0u8; 4096];
    let mut collected = Vec::new();
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if mirror {
                    use std::io::Write;
                    if to_stderr {
                        let mut err = std::io::stderr();
                        let _ = err.write_all(&buf[..n]);
                        let _ = err.flush();
                    } else {
                        let mut out = std::io::stdout();
                        let _ = out.write_all(&buf[..n]);
                        let _ = out.flush();
                    }
                }
                collected.extend_from_slice(&buf[..n]);
            }
            Err(_) => break,
        }
    }

    String::from_utf8_lossy(&collected).into_owned()
}
