//! Pipeline execution engine

pub mod engine;

pub use engine::{
    run_pipeline, run_pipeline_with_options, PipelineError, PipelineResult, RunOptions, StepResult,
};
