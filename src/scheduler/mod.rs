//! Schedule polling and deduplicated asynchronous firing

pub mod trigger;

pub use trigger::TriggerError;

use crate::core::config::{PipelineConfig, Schedule};
use crate::core::project::ProjectsConfig;
use crate::events::EventBroker;
use crate::execution::{run_pipeline_with_options, RunOptions};
use crate::persistence::RunStore;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// How often schedules are evaluated
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Runtime firing state of one schedule
#[derive(Debug, Clone, Copy, Default)]
struct FireState {
    last_fired: Option<DateTime<Local>>,
    running: bool,
}

/// Polls project schedules and triggers pipeline runs
///
/// One scheduler owns the fire-state map keyed by
/// `"<project>-schedule-<index>"`; the map is the only shared mutable
/// state and its lock is held only for the read-decide-write, never
/// across a triggered execution.
pub struct Scheduler {
    projects: ProjectsConfig,
    store: Arc<dyn RunStore>,
    broker: Arc<EventBroker>,
    base_dir: PathBuf,
    fire_state: Arc<Mutex<HashMap<String, FireState>>>,
    stop: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(
        projects: ProjectsConfig,
        store: Arc<dyn RunStore>,
        broker: Arc<EventBroker>,
        base_dir: PathBuf,
    ) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            projects,
            store,
            broker,
            base_dir,
            fire_state: Arc::new(Mutex::new(HashMap::new())),
            stop,
        }
    }

    /// Run the poll loop until `stop` is called
    ///
    /// The first evaluation happens immediately, then once per poll
    /// interval. In-flight executions are not cancelled by stopping.
    pub async fn run(&self) {
        info!("scheduler started");
        let mut shutdown = self.stop.subscribe();
        let mut ticker = tokio::time::interval(POLL_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(Local::now()).await,
                _ = shutdown.changed() => {
                    info!("scheduler stopped");
                    return;
                }
            }
        }
    }

    /// Halt the poll loop after the current tick
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Evaluate every schedule of every project once
    async fn tick(&self, now: DateTime<Local>) {
        for project in &self.projects.projects {
            let config_path = project.pipeline_path(&self.base_dir);
            let config = match PipelineConfig::from_file(&config_path) {
                Ok(config) => config,
                // A project without a loadable definition is skipped this tick
                Err(_) => continue,
            };
            if config.schedules.is_empty() {
                continue;
            }

            for (index, schedule) in config.schedules.iter().enumerate() {
                let key = format!("{}-schedule-{}", project.name, index);
                if !self.try_claim(&key, schedule, now) {
                    continue;
                }

                let targets = resolve_targets(schedule, &config, &project.name);
                self.spawn_execution(
                    project.name.clone(),
                    config_path.clone(),
                    key,
                    schedule,
                    targets,
                );
            }
        }
    }

    /// Atomically decide whether this schedule fires and mark it running
    fn try_claim(&self, key: &str, schedule: &Schedule, now: DateTime<Local>) -> bool {
        let mut state = self.fire_state.lock().unwrap();
        let entry = state.entry(key.to_string()).or_default();
        if entry.running {
            return false;
        }
        match trigger::due(schedule, entry.last_fired, now) {
            Ok(true) => {
                entry.running = true;
                entry.last_fired = Some(now);
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("schedule {} skipped: {}", key, e);
                false
            }
        }
    }

    /// Launch the triggered runs without blocking the poll loop
    fn spawn_execution(
        &self,
        project: String,
        config_path: PathBuf,
        key: String,
        schedule: &Schedule,
        targets: Option<Vec<String>>,
    ) {
        let store = Arc::clone(&self.store);
        let broker = Arc::clone(&self.broker);
        let fire_state = Arc::clone(&self.fire_state);
        let trigger_kind = trigger::describe(schedule);

        tokio::spawn(async move {
            let parts_label = match &targets {
                None => "all parts".to_string(),
                Some(parts) => parts.join(", "),
            };
            info!(
                "schedule triggered: {} (parts: {}) - {}",
                project, parts_label, trigger_kind
            );

            broker.broadcast(
                "run_started",
                &serde_json::json!({
                    "project": project,
                    "parts": targets.clone().unwrap_or_default(),
                    "type": "scheduled",
                }),
            );

            match &targets {
                None => {
                    let options = RunOptions {
                        store: Some(Arc::clone(&store)),
                        stream_output: false,
                        part_filter: None,
                    };
                    match run_pipeline_with_options(&config_path, options).await {
                        Ok(_) => info!("scheduled run completed: {}", project),
                        Err(e) => error!("scheduled run failed for {}: {}", project, e),
                    }
                }
                Some(parts) => {
                    for part in parts {
                        let options = RunOptions {
                            store: Some(Arc::clone(&store)),
                            stream_output: false,
                            part_filter: Some(part.clone()),
                        };
                        match run_pipeline_with_options(&config_path, options).await {
                            Ok(_) => info!("scheduled run completed: {} ({})", project, part),
                            Err(e) => {
                                error!("scheduled run failed for {} ({}): {}", project, part, e)
                            }
                        }
                    }
                }
            }

            let mut state = fire_state.lock().unwrap();
            if let Some(entry) = state.get_mut(&key) {
                entry.running = false;
            }
        });
    }
}

/// Resolve a schedule's named parts and groups against the definition
///
/// Returns None when nothing is named (run all parts). Missing targets
/// are skipped with a warning, not fatal to the schedule.
fn resolve_targets(
    schedule: &Schedule,
    config: &PipelineConfig,
    project: &str,
) -> Option<Vec<String>> {
    if schedule.parts.is_empty() && schedule.groups.is_empty() {
        return None;
    }

    let all = config.all_parts();
    let mut targets: Vec<String> = Vec::new();

    for group in &schedule.groups {
        let prefix = format!("{}.", group);
        let members: Vec<_> = all
            .keys()
            .filter(|name| name.starts_with(&prefix))
            .cloned()
            .collect();
        if members.is_empty() {
            warn!(
                "schedule target group '{}' not found in {}",
                group, project
            );
        }
        for member in members {
            if !targets.contains(&member) {
                targets.push(member);
            }
        }
    }

    for part in &schedule.parts {
        if all.contains_key(part) {
            if !targets.contains(part) {
                targets.push(part.clone());
            }
        } else {
            warn!("schedule target part '{}' not found in {}", part, project);
        }
    }

    Some(targets)
}
