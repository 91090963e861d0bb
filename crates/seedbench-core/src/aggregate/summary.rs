//! Summary merge: per-iteration metric tables into one cumulative table.
//!
//! The cumulative file is only ever appended to. A tag whose rows are already
//! present is not appended again, so the merge can be re-run safely.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use super::Aggregator;
use crate::error::Result;
use crate::iteration::IterationTag;

const MODEL_COLUMN: &str = "model";
const TAG_COLUMN: &str = "iteration_tag";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeReport {
    /// Rows for the tag were appended to the cumulative summary.
    Merged {
        tag: IterationTag,
        files: usize,
        rows: usize,
        summary: PathBuf,
    },
    /// The cumulative summary already holds this tag; only the per-tag summary was rewritten.
    AlreadyMerged {
        tag: IterationTag,
        files: usize,
        summary: PathBuf,
    },
    /// No metric files exist for the tag.
    NoMetrics { tag: IterationTag },
}

/// One metric file, already tagged with its model.
#[derive(Debug)]
struct MetricTable {
    model: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl MetricTable {
    fn load(path: &Path, model: String) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self {
            model,
            headers,
            rows,
        })
    }

    fn value(&self, row: &[String], column: &str) -> String {
        self.headers
            .iter()
            .position(|h| h == column)
            .and_then(|idx| row.get(idx))
            .cloned()
            .unwrap_or_default()
    }
}

impl Aggregator {
    /// Metric files for `tag` under `output_dir`, searched recursively, sorted by path.
    ///
    /// Returns `(model, path)` pairs; the model is the file name with
    /// `{metrics_suffix}_{tag}.csv` stripped.
    pub fn discover_metric_files(&self, tag: &IterationTag) -> Result<Vec<(String, PathBuf)>> {
        let suffix = format!("{}_{}.csv", self.metrics_suffix, tag);
        let mut found = Vec::new();

        if !self.output_dir.exists() {
            return Ok(found);
        }

        for entry in WalkDir::new(&self.output_dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if name.starts_with("summary_") {
                continue;
            }
            if let Some(model) = name.strip_suffix(suffix.as_str()) {
                if !model.is_empty() {
                    found.push((model.to_string(), entry.path().to_path_buf()));
                }
            }
        }

        found.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(found)
    }

    /// Merge every metric file of `tag` into `summary_{tag}.csv` and append to the
    /// cumulative summary.
    pub fn merge_summary(&self, tag: &IterationTag) -> Result<MergeReport> {
        let files = self.discover_metric_files(tag)?;
        if files.is_empty() {
            info!(tag = %tag, "No metrics found, skipping summary merge");
            return Ok(MergeReport::NoMetrics { tag: *tag });
        }

        let mut tables = Vec::with_capacity(files.len());
        for (model, path) in &files {
            tables.push(MetricTable::load(path, model.clone())?);
        }

        // Union of metric columns in first-seen order.
        let mut columns: Vec<String> = Vec::new();
        for table in &tables {
            for header in &table.headers {
                if header != MODEL_COLUMN && header != TAG_COLUMN && !columns.contains(header) {
                    columns.push(header.clone());
                }
            }
        }

        let mut header = vec![MODEL_COLUMN.to_string(), TAG_COLUMN.to_string()];
        header.extend(columns.iter().cloned());

        let tag_str = tag.to_string();
        let mut merged: Vec<Vec<String>> = Vec::new();
        for table in &tables {
            for row in &table.rows {
                let mut out = vec![table.model.clone(), tag_str.clone()];
                out.extend(columns.iter().map(|c| table.value(row, c)));
                merged.push(out);
            }
        }

        let per_tag = self.iteration_summary_path(tag);
        let mut writer = csv::Writer::from_path(&per_tag)?;
        writer.write_record(&header)?;
        for row in &merged {
            writer.write_record(row)?;
        }
        writer.flush()?;

        let cumulative = self.cumulative_summary_path();
        let appended = append_cumulative(&cumulative, &header, &merged, &tag_str)?;

        match appended {
            Some(rows) => {
                info!(tag = %tag, files = files.len(), rows, "Summary merged");
                Ok(MergeReport::Merged {
                    tag: *tag,
                    files: files.len(),
                    rows,
                    summary: cumulative,
                })
            }
            None => {
                info!(tag = %tag, "Cumulative summary already holds this iteration");
                Ok(MergeReport::AlreadyMerged {
                    tag: *tag,
                    files: files.len(),
                    summary: cumulative,
                })
            }
        }
    }
}

/// Append `rows` (laid out as `header`) to the cumulative file.
///
/// Returns `None` when rows for `tag` are already present. Existing files keep
/// their header; new rows are projected onto it.
fn append_cumulative(
    path: &Path,
    header: &[String],
    rows: &[Vec<String>],
    tag: &str,
) -> Result<Option<usize>> {
    let existing = path.exists() && std::fs::metadata(path)?.len() > 0;

    if !existing {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(header)?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        return Ok(Some(rows.len()));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let existing_header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let tag_idx = existing_header.iter().position(|h| h == TAG_COLUMN);

    if let Some(idx) = tag_idx {
        let mut merged_tags = HashSet::new();
        for record in reader.records() {
            if let Some(value) = record?.get(idx) {
                merged_tags.insert(value.to_string());
            }
        }
        if merged_tags.contains(tag) {
            return Ok(None);
        }
    }

    let dropped: Vec<&String> = header
        .iter()
        .filter(|h| !existing_header.contains(h))
        .collect();
    if !dropped.is_empty() {
        warn!(
            columns = ?dropped,
            "Cumulative summary has no such columns, values dropped"
        );
    }

    let projection: Vec<Option<usize>> = existing_header
        .iter()
        .map(|h| header.iter().position(|c| c == h))
        .collect();

    let file = OpenOptions::new().append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    for row in rows {
        let projected: Vec<&str> = projection
            .iter()
            .map(|idx| idx.and_then(|i| row.get(i)).map_or("", String::as_str))
            .collect();
        writer.write_record(&projected)?;
    }
    writer.flush()?;
    Ok(Some(rows.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator(dir: &Path) -> Aggregator {
        Aggregator::new(dir, vec!["lstm".into()], "subject_id", "_metrics")
    }

    #[test]
    fn test_discover_strips_suffix_and_recurses() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("gpu")).unwrap();
        std::fs::write(dir.path().join("lstm_metrics_iter1.csv"), "a\n1\n").unwrap();
        std::fs::write(dir.path().join("gpu/clinicalbert_metrics_iter1.csv"), "a\n1\n").unwrap();
        std::fs::write(dir.path().join("lstm_metrics_iter11.csv"), "a\n1\n").unwrap();
        std::fs::write(dir.path().join("lstm_probs_iter1.csv"), "a\n1\n").unwrap();

        let agg = aggregator(dir.path());
        let found = agg.discover_metric_files(&IterationTag::new(1)).unwrap();
        let models: Vec<&str> = found.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(models.len(), 2);
        assert!(models.contains(&"lstm"));
        assert!(models.contains(&"clinicalbert"));
    }

    #[test]
    fn test_no_metrics_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let report = aggregator(dir.path())
            .merge_summary(&IterationTag::new(9))
            .unwrap();
        assert_eq!(report, MergeReport::NoMetrics { tag: IterationTag::new(9) });
        assert!(!dir.path().join("summary_all_iterations.csv").exists());
    }

    #[test]
    fn test_columns_are_unioned() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gru_metrics_iter1.csv"), "auc,f1\n0.8,0.7\n").unwrap();
        std::fs::write(dir.path().join("lstm_metrics_iter1.csv"), "auc,brier\n0.9,0.1\n").unwrap();

        aggregator(dir.path())
            .merge_summary(&IterationTag::new(1))
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join("summary_iter1.csv")).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines[0], "model,iteration_tag,auc,f1,brier");
        assert_eq!(lines[1], "gru,iter1,0.8,0.7,");
        assert_eq!(lines[2], "lstm,iter1,0.9,,0.1");
    }

    #[test]
    fn test_append_projects_onto_existing_header() {
        let dir = tempfile::tempdir().unwrap();
        let agg = aggregator(dir.path());
        std::fs::write(dir.path().join("lstm_metrics_iter1.csv"), "auc\n0.9\n").unwrap();
        agg.merge_summary(&IterationTag::new(1)).unwrap();

        std::fs::write(dir.path().join("lstm_metrics_iter2.csv"), "f1,auc\n0.5,0.7\n").unwrap();
        let report = agg.merge_summary(&IterationTag::new(2)).unwrap();
        assert!(matches!(report, MergeReport::Merged { rows: 1, .. }));

        let raw = std::fs::read_to_string(agg.cumulative_summary_path()).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines, vec!["model,iteration_tag,auc", "lstm,iter1,0.9", "lstm,iter2,0.7"]);
    }
}
