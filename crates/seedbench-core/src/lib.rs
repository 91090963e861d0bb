//! seedbench Core Library
//!
//! Domain types and durable state for resumable multi-seed benchmarks:
//! - Iteration identity (`IterationContext`, `IterationTag`, `Device`)
//! - The append-only Run Record Store and the Resume Planner
//! - Cross-run aggregation (alignment check, summary merge, best stacker)
//! - Configuration, device probing, resource logging and tracing setup

pub mod aggregate;
pub mod audit;
pub mod config;
pub mod device;
pub mod error;
pub mod fakes;
pub mod iteration;
pub mod obs;
pub mod planner;
pub mod records;
pub mod resources;
pub mod telemetry;

pub use aggregate::{
    intersect_ids, select_best_stacker, Aggregator, AlignmentReport, AlignmentSummary,
    BestStacker, MergeReport,
};
pub use audit::{audit_seeds, extract_seed, SeedAudit};
pub use config::{BenchConfig, JobSpec, StageSpec, DEFAULT_CONFIG_FILE, DEFAULT_REQUIRED_MODELS};
pub use device::{detect_device, resolve_device};
pub use error::{BenchError, Result};
pub use iteration::{Device, IterationContext, IterationOutcome, IterationStatus, IterationTag};
pub use obs::IterationSpan;
pub use planner::{ResumePlan, ResumePlanner};
pub use records::{CsvRunRecordStore, RunRecord, RunRecordStore, RUN_RECORD_HEADER};
pub use resources::{ResourceLog, ResourceUsage, SystemSample};
pub use telemetry::init_tracing;
