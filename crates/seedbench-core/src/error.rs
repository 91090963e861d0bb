//! Error types for seedbench-core

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while planning, recording or aggregating a benchmark.
#[derive(Error, Debug)]
pub enum BenchError {
    /// A required program or file is absent. Fatal: aborts the batch before it starts.
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    /// Configuration file could not be parsed or is semantically invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A tag that does not follow the `iter{N}` convention.
    #[error("Invalid iteration tag: {0}")]
    InvalidTag(String),

    /// The run record file exists but could not be parsed.
    #[error("Corrupt run record file {path}: {reason}")]
    CorruptRecords { path: PathBuf, reason: String },

    /// A metric artifact is missing a column the aggregator depends on.
    #[error("Artifact {path} has no column '{column}'")]
    MissingColumn { path: PathBuf, column: String },

    /// No `stacker_best_model_folds_*` files were found.
    #[error("No fold-score files found under {0}")]
    NoFoldScores(PathBuf),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<toml::de::Error> for BenchError {
    fn from(err: toml::de::Error) -> Self {
        BenchError::InvalidConfig(err.to_string())
    }
}

impl From<walkdir::Error> for BenchError {
    fn from(err: walkdir::Error) -> Self {
        BenchError::Io(std::io::Error::other(err.to_string()))
    }
}

/// Result type for seedbench-core operations
pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_displays_path_and_column() {
        let err = BenchError::MissingColumn {
            path: PathBuf::from("out/lstm_probs_iter1.csv"),
            column: "subject_id".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("lstm_probs_iter1.csv"));
        assert!(msg.contains("subject_id"));
    }

    #[test]
    fn test_toml_error_becomes_invalid_config() {
        let parse: std::result::Result<toml::Value, _> = toml::from_str("total_iterations = ");
        let err: BenchError = parse.unwrap_err().into();
        assert!(matches!(err, BenchError::InvalidConfig(_)));
    }
}
