//! Benchmark configuration.
//!
//! A `seedbench.toml` file describes the batch: how many iterations to run,
//! where artifacts live, and which external jobs form one iteration's
//! pipeline. Every field has a default so an empty file is valid apart from
//! the pipeline itself, which [`BenchConfig::validate`] requires.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BenchError, Result};
use crate::iteration::{Device, IterationTag};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "seedbench.toml";

/// Models whose probability artifacts feed the stacking meta-learner.
pub const DEFAULT_REQUIRED_MODELS: [&str; 7] = [
    "lstm",
    "gru",
    "transformer",
    "clinicalbert",
    "tfidf_logreg",
    "tfidf_rf",
    "tfidf_xgb",
];

/// One external job. `command[0]` is the executable.
///
/// Arguments may contain `{tag}`, `{seed}`, `{device}` and `{iteration}`
/// placeholders, substituted per iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub command: Vec<String>,
    /// Zero disables the timeout.
    #[serde(default)]
    pub timeout_secs: u64,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            timeout_secs: 0,
        }
    }
}

/// A group of jobs launched together; the next stage starts once all have reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    pub jobs: Vec<JobSpec>,
}

impl StageSpec {
    pub fn new(name: impl Into<String>, jobs: Vec<JobSpec>) -> Self {
        Self {
            name: name.into(),
            jobs,
        }
    }
}

/// Top-level benchmark configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub total_iterations: u32,
    pub seed_offset: u64,
    /// Directory holding metric artifacts, summaries and sentinels.
    pub output_dir: PathBuf,
    /// Directory holding per-iteration logs (relative paths resolve against `output_dir`).
    pub log_dir: PathBuf,
    /// Run record CSV (relative paths resolve against `output_dir`).
    pub run_records: PathBuf,
    /// Resource usage CSV (relative paths resolve against `output_dir`).
    pub resource_log: PathBuf,
    pub pause_between_iterations_secs: u64,
    /// Overrides the device probe. `"none"` forces unaccelerated execution.
    pub device: Option<String>,
    pub sample_id_column: String,
    pub metrics_suffix: String,
    pub required_models: Vec<String>,
    /// Files that must exist before the batch starts (training scripts, datasets).
    pub required_files: Vec<PathBuf>,
    pub stages: Vec<StageSpec>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            total_iterations: 5,
            seed_offset: 0,
            output_dir: PathBuf::from("."),
            log_dir: PathBuf::from("logs"),
            run_records: PathBuf::from("iteration_runs.csv"),
            resource_log: PathBuf::from("resource_usage.csv"),
            pause_between_iterations_secs: 5,
            device: None,
            sample_id_column: "subject_id".to_string(),
            metrics_suffix: "_metrics".to_string(),
            required_models: DEFAULT_REQUIRED_MODELS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            required_files: Vec::new(),
            stages: Vec::new(),
        }
    }
}

impl BenchConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load from a TOML file. A missing file is a [`BenchError::MissingDependency`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BenchError::MissingDependency(format!("config file {}", path.display()))
            } else {
                BenchError::Io(e)
            }
        })?;
        Self::from_toml_str(&raw)
    }

    /// Reject configurations that can never produce a meaningful batch.
    pub fn validate(&self) -> Result<()> {
        if self.total_iterations == 0 {
            return Err(BenchError::InvalidConfig(
                "total_iterations must be at least 1".to_string(),
            ));
        }
        if self.stages.is_empty() {
            return Err(BenchError::InvalidConfig(
                "at least one stage is required".to_string(),
            ));
        }
        for stage in &self.stages {
            if stage.jobs.is_empty() {
                return Err(BenchError::InvalidConfig(format!(
                    "stage '{}' has no jobs",
                    stage.name
                )));
            }
            if let Some(job) = stage.jobs.iter().find(|j| j.command.is_empty()) {
                return Err(BenchError::InvalidConfig(format!(
                    "job '{}' in stage '{}' has an empty command",
                    job.name, stage.name
                )));
            }
        }
        if self.required_models.is_empty() {
            return Err(BenchError::InvalidConfig(
                "required_models must not be empty".to_string(),
            ));
        }
        if self.sample_id_column.is_empty() {
            return Err(BenchError::InvalidConfig(
                "sample_id_column must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Fail fast when a required file is absent.
    pub fn check_required_files(&self) -> Result<()> {
        for file in &self.required_files {
            if !file.exists() {
                return Err(BenchError::MissingDependency(file.display().to_string()));
            }
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.output_dir.join(path)
        }
    }

    pub fn log_dir_path(&self) -> PathBuf {
        self.resolve(&self.log_dir)
    }

    pub fn run_records_path(&self) -> PathBuf {
        self.resolve(&self.run_records)
    }

    pub fn resource_log_path(&self) -> PathBuf {
        self.resolve(&self.resource_log)
    }

    /// Log file for one iteration: `{log_dir}/{tag}.log`.
    pub fn iteration_log_path(&self, tag: &IterationTag) -> PathBuf {
        self.log_dir_path().join(format!("{tag}.log"))
    }

    /// Device override from config, if any.
    pub fn device_override(&self) -> Option<Device> {
        self.device
            .as_deref()
            .map(|d| d.parse::<Device>().unwrap_or_default())
    }

    pub fn pause(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.pause_between_iterations_secs)
    }
}
