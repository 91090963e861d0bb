//! Structured observability hooks for the batch lifecycle.
//!
//! This module provides:
//! - Iteration-scoped tracing spans via the `IterationSpan` RAII guard
//! - Emission functions for batch start/finish, iteration start/finish,
//!   alignment checks and summary merges
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).
//! For JSON output, pass `--json` to the binary.

use tracing::{info, warn};

use crate::iteration::{IterationContext, IterationOutcome};

/// RAII guard that enters an iteration-scoped span for the duration of an iteration.
///
/// ```ignore
/// let _span = IterationSpan::enter(&ctx);
/// // every tracing call below carries tag=iterN seed=N
/// ```
pub struct IterationSpan {
    _span: tracing::span::EnteredSpan,
}

impl IterationSpan {
    pub fn enter(ctx: &IterationContext) -> Self {
        let span = tracing::info_span!(
            "seedbench.iteration",
            tag = %ctx.tag,
            seed = ctx.seed,
            device = %ctx.device,
        );
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: batch started at `resume_index` of `total`.
pub fn emit_batch_started(resume_index: u32, total: u32, device: &str) {
    info!(
        event = "batch.started",
        resume_index = resume_index,
        total = total,
        device = %device,
    );
}

/// Emit event: batch skipped because every iteration was already attempted.
pub fn emit_batch_already_complete(total: u32) {
    info!(event = "batch.already_complete", total = total);
}

/// Emit event: batch finished.
pub fn emit_batch_finished(attempted: usize, failed: usize) {
    info!(event = "batch.finished", attempted = attempted, failed = failed);
}

pub fn emit_iteration_started(ctx: &IterationContext) {
    info!(
        event = "iteration.started",
        tag = %ctx.tag,
        index = ctx.index,
        total = ctx.total,
        seed = ctx.seed,
    );
}

/// Emit event: iteration reached a terminal state. Failures log at `warn!`.
pub fn emit_iteration_finished(ctx: &IterationContext, outcome: &IterationOutcome, duration_sec: u64) {
    match outcome {
        IterationOutcome::Succeeded => info!(
            event = "iteration.finished",
            tag = %ctx.tag,
            status = "succeeded",
            duration_sec = duration_sec,
        ),
        IterationOutcome::Failed {
            stage,
            reason,
            exit_code,
        } => warn!(
            event = "iteration.finished",
            tag = %ctx.tag,
            status = "failed",
            stage = %stage,
            reason = %reason,
            exit_code = ?exit_code,
            duration_sec = duration_sec,
        ),
    }
}

pub fn emit_alignment_checked(tag: &str, aligned_count: Option<usize>) {
    info!(event = "alignment.checked", tag = %tag, aligned_count = ?aligned_count);
}

pub fn emit_summary_merged(tag: &str, outcome: &str) {
    info!(event = "summary.merged", tag = %tag, outcome = %outcome);
}

/// Emit event: an aggregation step failed for one tag (warning level, never fatal).
pub fn emit_aggregation_error(tag: &str, step: &str, error: &dyn std::fmt::Display) {
    warn!(event = "aggregation.error", tag = %tag, step = %step, error = %error);
}
