//! seedbench runner - iteration execution and batch control
//!
//! Provides the orchestration half of seedbench:
//! - Renders configured jobs for one iteration (tag, seed, device)
//! - Runs each stage as a fork/join task group with output streamed to the iteration log
//! - Appends one run record per attempted iteration
//! - Resumes a batch after the highest recorded iteration, then aggregates

pub mod controller;
pub mod error;
pub mod executor;
pub mod log;
pub mod runner;
pub mod stage;
pub mod task_group;

// Re-export key types
pub use controller::{
    aggregate_tag, find_executable, BatchController, BatchReport, BatchState, TagAggregation,
};
pub use error::{Result, RunnerError};
pub use executor::{IterationExecutor, IterationReport, SETUP_STAGE};
pub use log::IterationLog;
pub use runner::{JobResult, JobRunner};
pub use stage::{resolve_stage, ResolvedJob, ResolvedStage};
pub use task_group::{GroupResult, TaskGroup};
