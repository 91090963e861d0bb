//! Cross-run aggregation.
//!
//! Consumes the metric artifacts external collaborators leave behind:
//! - [`alignment`]: sample-id intersection across the stacking inputs of one tag
//! - [`summary`]: per-tag and cumulative metric tables
//! - [`best`]: best stacking meta-learner across all iterations
//!
//! Nothing here is fatal to a batch; callers log errors and move on.

pub mod alignment;
pub mod best;
pub mod summary;

use std::path::{Path, PathBuf};

use crate::config::BenchConfig;
use crate::iteration::IterationTag;

pub use alignment::{intersect_ids, AlignmentReport, AlignmentSummary};
pub use best::{select_best_stacker, BestStacker};
pub use summary::MergeReport;

/// File name of the cumulative summary in `output_dir`.
pub const CUMULATIVE_SUMMARY_FILE: &str = "summary_all_iterations.csv";

/// Aggregation settings shared by the alignment check and the summary merge.
#[derive(Debug, Clone)]
pub struct Aggregator {
    output_dir: PathBuf,
    required_models: Vec<String>,
    sample_id_column: String,
    metrics_suffix: String,
}

impl Aggregator {
    pub fn new(
        output_dir: impl AsRef<Path>,
        required_models: Vec<String>,
        sample_id_column: impl Into<String>,
        metrics_suffix: impl Into<String>,
    ) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            required_models,
            sample_id_column: sample_id_column.into(),
            metrics_suffix: metrics_suffix.into(),
        }
    }

    pub fn from_config(config: &BenchConfig) -> Self {
        Self::new(
            &config.output_dir,
            config.required_models.clone(),
            config.sample_id_column.clone(),
            config.metrics_suffix.clone(),
        )
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `{model}_probs_{tag}.csv`
    pub fn probs_path(&self, model: &str, tag: &IterationTag) -> PathBuf {
        self.output_dir.join(format!("{model}_probs_{tag}.csv"))
    }

    /// Zero-byte marker written when stacking inputs are incomplete.
    pub fn sentinel_path(&self, tag: &IterationTag) -> PathBuf {
        self.output_dir.join(format!("stacking_skipped_{tag}.flag"))
    }

    pub fn alignment_path(&self, tag: &IterationTag) -> PathBuf {
        self.output_dir.join(format!("alignment_{tag}.json"))
    }

    pub fn iteration_summary_path(&self, tag: &IterationTag) -> PathBuf {
        self.output_dir.join(format!("summary_{tag}.csv"))
    }

    pub fn cumulative_summary_path(&self) -> PathBuf {
        self.output_dir.join(CUMULATIVE_SUMMARY_FILE)
    }
}
