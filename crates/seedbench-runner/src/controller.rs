//! Batch control: resume, run the remaining iterations, aggregate.
//!
//! ```text
//! AwaitingStart -> Iterating -> Aggregating -> Done
//!        \______________________________________/  (nothing left to run)
//! ```
//!
//! Iterations run strictly one after another. A failed iteration is recorded
//! and the batch moves on; only preflight and record store errors abort a
//! batch.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use seedbench_core::obs::{
    emit_aggregation_error, emit_alignment_checked, emit_batch_already_complete,
    emit_batch_finished, emit_batch_started, emit_summary_merged,
};
use seedbench_core::{
    Aggregator, AlignmentReport, BenchConfig, BenchError, Device, IterationContext, IterationTag,
    MergeReport, ResumePlan, ResumePlanner, RunRecordStore,
};
use tracing::{debug, info};

use crate::error::Result;
use crate::executor::{IterationExecutor, IterationReport};

/// Batch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    AwaitingStart,
    Iterating,
    Aggregating,
    Done,
}

/// Aggregation results for one recorded tag. Errors are kept as text.
#[derive(Debug, Clone)]
pub struct TagAggregation {
    pub tag: IterationTag,
    pub alignment: std::result::Result<AlignmentReport, String>,
    pub merge: std::result::Result<MergeReport, String>,
}

/// What a batch did.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub plan: ResumePlan,
    pub device: Device,
    pub iterations: Vec<IterationReport>,
    pub aggregations: Vec<TagAggregation>,
    /// Every state visited, in order.
    pub transitions: Vec<BatchState>,
}

impl BatchReport {
    pub fn attempted(&self) -> usize {
        self.iterations.len()
    }

    pub fn failed(&self) -> usize {
        self.iterations
            .iter()
            .filter(|r| !r.outcome.is_success())
            .count()
    }

    pub fn final_state(&self) -> BatchState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(BatchState::AwaitingStart)
    }
}

/// Drives one batch from the resume point to the configured total.
pub struct BatchController {
    config: BenchConfig,
    store: Arc<dyn RunRecordStore>,
    device: Device,
    state: BatchState,
    transitions: Vec<BatchState>,
}

impl BatchController {
    /// `device` is the already-resolved accelerator for the whole batch.
    pub fn new(config: BenchConfig, store: Arc<dyn RunRecordStore>, device: Device) -> Self {
        Self {
            config,
            store,
            device,
            state: BatchState::AwaitingStart,
            transitions: vec![BatchState::AwaitingStart],
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    fn transition(&mut self, next: BatchState) {
        debug!(from = ?self.state, to = ?next, "Batch state transition");
        self.state = next;
        self.transitions.push(next);
    }

    /// Validate configuration and confirm every collaborator can be found.
    pub fn preflight(&self) -> Result<()> {
        self.config.validate()?;
        self.config.check_required_files()?;
        for stage in &self.config.stages {
            for job in &stage.jobs {
                if let Some(exe) = job.command.first() {
                    if find_executable(exe).is_none() {
                        return Err(BenchError::MissingDependency(format!(
                            "executable '{}' for job '{}'",
                            exe, job.name
                        ))
                        .into());
                    }
                }
            }
        }
        Ok(())
    }

    /// Resume point from the union of recorded tags and iteration logs on disk.
    pub fn plan(&self) -> Result<ResumePlan> {
        let mut observed: BTreeSet<IterationTag> =
            self.store.recorded_tags()?.into_iter().collect();
        observed.extend(ResumePlanner::tags_from_log_dir(
            &self.config.log_dir_path(),
        )?);
        Ok(ResumePlanner::plan(&observed, self.config.total_iterations))
    }

    /// Run the batch to completion.
    ///
    /// Errors only for preflight, planning, or a record store that cannot be
    /// read or synced. Aggregation covers every recorded iteration, not only
    /// those run by this call.
    /// Iteration failures and aggregation failures are reported, not raised.
    pub async fn run(mut self) -> Result<BatchReport> {
        self.preflight()?;
        let plan = self.plan()?;
        let total = self.config.total_iterations;

        let Some(first) = plan.next_index() else {
            emit_batch_already_complete(total);
            self.transition(BatchState::Done);
            return Ok(self.report(plan, Vec::new(), Vec::new()));
        };

        emit_batch_started(first, total, &self.device.to_string());
        self.transition(BatchState::Iterating);

        let executor = IterationExecutor::new(&self.config, self.store.clone());
        let mut iterations = Vec::new();
        for index in first..=total {
            let ctx = IterationContext::new(
                index,
                total,
                self.config.seed_offset,
                self.device.clone(),
            );
            let report = executor.execute(ctx).await;
            self.store.sync()?;
            iterations.push(report);

            if index < total && !self.config.pause().is_zero() {
                debug!(secs = self.config.pause().as_secs(), "Pausing between iterations");
                tokio::time::sleep(self.config.pause()).await;
            }
        }

        self.transition(BatchState::Aggregating);
        let tags = self.completed_tags(&iterations)?;
        let aggregator = Aggregator::from_config(&self.config);
        let aggregations = tags
            .iter()
            .map(|tag| aggregate_tag(&aggregator, tag))
            .collect();

        self.transition(BatchState::Done);
        let report = self.report(plan, iterations, aggregations);
        emit_batch_finished(report.attempted(), report.failed());
        Ok(report)
    }

    /// Every recorded tag within the batch plus the tags attempted just now,
    /// in index order. Earlier tags are re-aggregated so a batch interrupted
    /// before its aggregation phase still gets merged.
    fn completed_tags(&self, attempted: &[IterationReport]) -> Result<BTreeSet<IterationTag>> {
        let total = self.config.total_iterations;
        let mut tags: BTreeSet<IterationTag> = self
            .store
            .recorded_tags()?
            .into_iter()
            .filter(|tag| tag.index() <= total)
            .collect();
        tags.extend(attempted.iter().map(|r| r.context.tag));
        Ok(tags)
    }

    fn report(
        &self,
        plan: ResumePlan,
        iterations: Vec<IterationReport>,
        aggregations: Vec<TagAggregation>,
    ) -> BatchReport {
        BatchReport {
            plan,
            device: self.device.clone(),
            iterations,
            aggregations,
            transitions: self.transitions.clone(),
        }
    }
}

/// Alignment check then summary merge for one tag. Never fails.
pub fn aggregate_tag(aggregator: &Aggregator, tag: &IterationTag) -> TagAggregation {
    let tag_str = tag.to_string();

    let alignment = aggregator.check_alignment(tag).map_err(|e| {
        emit_aggregation_error(&tag_str, "alignment", &e);
        e.to_string()
    });
    if let Ok(report) = &alignment {
        emit_alignment_checked(&tag_str, report.aligned_count());
    }

    let merge = aggregator.merge_summary(tag).map_err(|e| {
        emit_aggregation_error(&tag_str, "merge", &e);
        e.to_string()
    });
    if let Ok(report) = &merge {
        let outcome = match report {
            MergeReport::Merged { .. } => "merged",
            MergeReport::AlreadyMerged { .. } => "already_merged",
            MergeReport::NoMetrics { .. } => "no_metrics",
        };
        emit_summary_merged(&tag_str, outcome);
    }

    info!(tag = %tag, "Aggregation finished");
    TagAggregation {
        tag: *tag,
        alignment,
        merge,
    }
}

/// Resolve `exe` the way a shell would: paths with a separator are checked
/// directly, bare names are searched on `PATH`.
pub fn find_executable(exe: &str) -> Option<PathBuf> {
    let candidate = Path::new(exe);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(exe))
        .find(|p| p.is_file())
}
