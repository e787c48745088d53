//! pipewright - scheduled multi-step command pipelines with durable run history

pub mod cli;
pub mod core;
pub mod events;
pub mod execution;
pub mod persistence;
pub mod scheduler;

// Re-export commonly used types
pub use crate::core::config::{PipelineConfig, Schedule, Step};
pub use crate::core::project::{Project, ProjectsConfig};
pub use crate::events::{EventBroker, Subscription};
pub use crate::execution::{
    run_pipeline, run_pipeline_with_options, PipelineError, PipelineResult, RunOptions, StepResult,
};
#[cfg(feature = "sqlite")]
pub use crate::persistence::SqliteStore;
pub use crate::persistence::{Run, RunStatus, RunStore, StepExecution};
pub use crate::scheduler::Scheduler;
