//! Iteration execution.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use seedbench_core::obs::{emit_iteration_finished, emit_iteration_started};
use seedbench_core::{
    BenchConfig, IterationContext, IterationOutcome, IterationSpan, ResourceLog, ResourceUsage,
    RunRecord, RunRecordStore, StageSpec, SystemSample,
};
use tracing::{error, warn};

use crate::log::IterationLog;
use crate::stage::resolve_stage;
use crate::task_group::{GroupResult, TaskGroup};

/// Stage name reported when the iteration failed before any stage ran.
pub const SETUP_STAGE: &str = "setup";

/// Everything one iteration produced.
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub context: IterationContext,
    pub outcome: IterationOutcome,
    /// The record appended to the store.
    pub record: RunRecord,
    /// Stages that ran, in order. Stages after the first failure are absent.
    pub stages: Vec<GroupResult>,
    pub log_path: PathBuf,
}

/// Runs the configured pipeline for one iteration.
pub struct IterationExecutor {
    stages: Vec<StageSpec>,
    log_dir: PathBuf,
    output_dir: PathBuf,
    store: Arc<dyn RunRecordStore>,
    resources: ResourceLog,
}

impl IterationExecutor {
    pub fn new(config: &BenchConfig, store: Arc<dyn RunRecordStore>) -> Self {
        Self {
            stages: config.stages.clone(),
            log_dir: config.log_dir_path(),
            output_dir: config.output_dir.clone(),
            store,
            resources: ResourceLog::new(config.resource_log_path()),
        }
    }

    pub fn log_path(&self, ctx: &IterationContext) -> PathBuf {
        self.log_dir.join(format!("{}.log", ctx.tag))
    }

    /// Execute one iteration.
    ///
    /// Never fails: job failures become [`IterationOutcome::Failed`] and a
    /// [`RunRecord`] is appended whatever the outcome. Store and resource log
    /// errors are logged and otherwise ignored.
    pub async fn execute(&self, ctx: IterationContext) -> IterationReport {
        let _span = IterationSpan::enter(&ctx);
        emit_iteration_started(&ctx);

        let start_time = Utc::now();
        let clock = Instant::now();
        let log_path = self.log_path(&ctx);

        let (outcome, stages) = match IterationLog::open(&log_path).await {
            Ok(log) => {
                let result = self.run_stages(&ctx, &log).await;
                let status_line = match &result.0 {
                    IterationOutcome::Succeeded => format!("=== {} exit status: 0 ===", ctx.tag),
                    IterationOutcome::Failed {
                        stage, exit_code, ..
                    } => format!(
                        "=== {} exit status: {} (stage {}) ===",
                        ctx.tag,
                        exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()),
                        stage
                    ),
                };
                if let Err(e) = log.write_line(&status_line).await {
                    warn!(path = %log_path.display(), error = %e, "Failed to write exit status");
                }
                if let Err(e) = log.sync().await {
                    warn!(path = %log_path.display(), error = %e, "Failed to sync iteration log");
                }
                result
            }
            Err(e) => {
                error!(path = %log_path.display(), error = %e, "Failed to open iteration log");
                let outcome = IterationOutcome::Failed {
                    stage: SETUP_STAGE.to_string(),
                    reason: format!("cannot open log {}: {}", log_path.display(), e),
                    exit_code: None,
                };
                (outcome, Vec::new())
            }
        };

        let end_time = Utc::now();
        let record = RunRecord::new(ctx.tag, start_time, end_time, &ctx.device);
        if let Err(e) = self.store.append(&record) {
            error!(tag = %ctx.tag, error = %e, "Failed to append run record");
        }

        let elapsed = clock.elapsed();
        let sample = SystemSample::capture(&self.output_dir).await;
        let usage = ResourceUsage::new(ctx.tag, elapsed, &ctx.device, &outcome, sample);
        if let Err(e) = self.resources.append(&usage) {
            warn!(tag = %ctx.tag, error = %e, "Failed to append resource usage");
        }

        emit_iteration_finished(&ctx, &outcome, record.duration_sec);

        IterationReport {
            context: ctx,
            outcome,
            record,
            stages,
            log_path,
        }
    }

    /// Run stages in order, stopping after the first stage with a failed job.
    async fn run_stages(
        &self,
        ctx: &IterationContext,
        log: &IterationLog,
    ) -> (IterationOutcome, Vec<GroupResult>) {
        let header = format!("=== {} seed={} device={} ===", ctx.tag, ctx.seed, ctx.device);
        if let Err(e) = log.write_line(&header).await {
            warn!(error = %e, "Failed to write iteration header");
        }

        let mut results = Vec::with_capacity(self.stages.len());
        for spec in &self.stages {
            let group = TaskGroup::new(resolve_stage(spec, ctx)).run(log).await;
            let failure = group.first_failure().map(|job| IterationOutcome::Failed {
                stage: group.stage.clone(),
                reason: job
                    .failure_reason()
                    .unwrap_or_else(|| format!("job '{}' failed", job.job_name)),
                exit_code: job.exit_code,
            });
            results.push(group);
            if let Some(outcome) = failure {
                return (outcome, results);
            }
        }
        (IterationOutcome::Succeeded, results)
    }
}
