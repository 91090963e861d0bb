//! Error types for seedbench-runner

use seedbench_core::BenchError;
use thiserror::Error;

/// Errors raised while launching jobs or driving a batch.
///
/// Job-level variants never escape an iteration: the executor folds them into
/// a failed `IterationOutcome`.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Job has no executable.
    #[error("Job '{0}' has an empty command")]
    EmptyCommand(String),

    /// Job could not be started.
    #[error("Job '{job}' failed to start: {source}")]
    Spawn {
        job: String,
        #[source]
        source: std::io::Error,
    },

    /// Job ran longer than its configured timeout and was killed.
    #[error("Job '{job}' timed out after {secs} seconds")]
    Timeout { job: String, secs: u64 },

    /// Bubbled-up core error (config, record store, missing dependency).
    #[error(transparent)]
    Bench(#[from] BenchError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for seedbench-runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_displays_job_and_secs() {
        let err = RunnerError::Timeout {
            job: "clinicalbert".to_string(),
            secs: 30,
        };
        let msg = err.to_string();
        assert!(msg.contains("clinicalbert"));
        assert!(msg.contains("30"));
    }

    #[test]
    fn test_missing_dependency_is_transparent() {
        let err: RunnerError = BenchError::MissingDependency("train_lstm.py".to_string()).into();
        assert_eq!(err.to_string(), "Missing dependency: train_lstm.py");
    }
}
