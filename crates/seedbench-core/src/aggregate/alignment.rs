//! Alignment check for stacking inputs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::Aggregator;
use crate::error::{BenchError, Result};
use crate::iteration::IterationTag;

/// Persisted result of a successful alignment check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentSummary {
    pub tag: IterationTag,
    pub aligned_count: usize,
    /// Distinct sample ids per model, before intersection.
    pub per_model: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignmentReport {
    /// Every required artifact was present.
    Aligned(AlignmentSummary),
    /// At least one required artifact was missing; a sentinel was written.
    Skipped {
        tag: IterationTag,
        missing: Vec<String>,
        sentinel: PathBuf,
    },
}

impl AlignmentReport {
    pub fn aligned_count(&self) -> Option<usize> {
        match self {
            AlignmentReport::Aligned(summary) => Some(summary.aligned_count),
            AlignmentReport::Skipped { .. } => None,
        }
    }
}

/// Intersection of every set; empty input yields an empty set.
pub fn intersect_ids(sets: &[HashSet<String>]) -> HashSet<String> {
    let Some((first, rest)) = sets.split_first() else {
        return HashSet::new();
    };
    first
        .iter()
        .filter(|id| rest.iter().all(|s| s.contains(*id)))
        .cloned()
        .collect()
}

/// Distinct, trimmed values of `column` in a CSV file.
pub fn load_id_set(path: &Path, column: &str) -> Result<HashSet<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let idx = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| BenchError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        })?;

    let mut ids = HashSet::new();
    for record in reader.records() {
        let record = record?;
        if let Some(value) = record.get(idx) {
            let value = value.trim();
            if !value.is_empty() {
                ids.insert(value.to_string());
            }
        }
    }
    Ok(ids)
}

impl Aggregator {
    /// Verify every required artifact exists for `tag` and persist the aligned count.
    pub fn check_alignment(&self, tag: &IterationTag) -> Result<AlignmentReport> {
        let missing: Vec<String> = self
            .required_models
            .iter()
            .filter(|model| !self.probs_path(model, tag).exists())
            .cloned()
            .collect();

        let sentinel = self.sentinel_path(tag);
        if !missing.is_empty() {
            warn!(
                tag = %tag,
                missing = ?missing,
                "Missing stacking inputs, skipping stacking for this iteration"
            );
            std::fs::create_dir_all(&self.output_dir)?;
            std::fs::File::create(&sentinel)?;
            return Ok(AlignmentReport::Skipped {
                tag: *tag,
                missing,
                sentinel,
            });
        }

        let mut per_model = BTreeMap::new();
        let mut sets = Vec::with_capacity(self.required_models.len());
        for model in &self.required_models {
            let ids = load_id_set(&self.probs_path(model, tag), &self.sample_id_column)?;
            per_model.insert(model.clone(), ids.len());
            sets.push(ids);
        }

        let summary = AlignmentSummary {
            tag: *tag,
            aligned_count: intersect_ids(&sets).len(),
            per_model,
        };
        std::fs::write(
            self.alignment_path(tag),
            serde_json::to_vec_pretty(&summary)?,
        )?;

        // A stale marker from an earlier incomplete attempt no longer applies.
        if sentinel.exists() {
            std::fs::remove_file(&sentinel)?;
        }

        info!(tag = %tag, aligned = summary.aligned_count, "Stacking inputs aligned");
        Ok(AlignmentReport::Aligned(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u32]) -> HashSet<String> {
        ids.iter().map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_intersection_of_three() {
        let sets = vec![set(&[1, 2, 3]), set(&[2, 3, 4]), set(&[2, 3, 5])];
        let common = intersect_ids(&sets);
        assert_eq!(common.len(), 2);
        assert!(common.contains("2") && common.contains("3"));
    }

    #[test]
    fn test_intersection_edge_cases() {
        assert!(intersect_ids(&[]).is_empty());
        assert_eq!(intersect_ids(&[set(&[7, 8])]).len(), 2);
        assert!(intersect_ids(&[set(&[1]), set(&[2])]).is_empty());
    }

    #[test]
    fn test_load_id_set_trims_and_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lstm_probs_iter1.csv");
        std::fs::write(&path, "subject_id,prob\n 10 ,0.2\n10,0.3\n11,0.9\n,0.1\n").unwrap();
        let ids = load_id_set(&path, "subject_id").unwrap();
        assert_eq!(ids, set(&[10, 11]));
    }

    #[test]
    fn test_load_id_set_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gru_probs_iter1.csv");
        std::fs::write(&path, "hadm_id,prob\n1,0.5\n").unwrap();
        assert!(matches!(
            load_id_set(&path, "subject_id"),
            Err(BenchError::MissingColumn { .. })
        ));
    }
}
