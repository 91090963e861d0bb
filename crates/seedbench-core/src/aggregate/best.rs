//! Best stacking meta-learner across iterations.
//!
//! Each iteration's stacker writes `stacker_best_model_folds_{tag}.csv` with
//! one `Macro-F1` value per cross-validation fold. The iteration with the
//! highest mean wins; its artifacts are copied under an `across_iterations`
//! name and a model card is written next to them.

use regex::Regex;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::info;

use crate::error::{BenchError, Result};
use crate::iteration::IterationTag;

pub const FOLD_SCORE_PREFIX: &str = "stacker_best_model_folds_";
pub const SCORE_COLUMN: &str = "Macro-F1";
pub const ACROSS_ITERATIONS: &str = "across_iterations";
pub const MODEL_CARD_FILE: &str = "best-stacker-model-across-iterations.md";

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(iter[0-9]+)").expect("static regex is valid"))
}

/// Outcome of the cross-iteration selection.
#[derive(Debug, Clone, PartialEq)]
pub struct BestStacker {
    pub tag: IterationTag,
    pub avg_macro_f1: f64,
    pub iterations_found: usize,
    /// Files written under the `across_iterations` name.
    pub copied: Vec<PathBuf>,
    pub model_card: PathBuf,
}

/// Mean of the non-empty numeric values in `column`.
fn column_mean(path: &Path, column: &str) -> Result<Option<f64>> {
    let mut reader = csv::Reader::from_path(path)?;
    let idx = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| BenchError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        })?;

    let mut sum = 0.0;
    let mut n = 0usize;
    for record in reader.records() {
        let record = record?;
        if let Some(v) = record.get(idx).and_then(|v| v.trim().parse::<f64>().ok()) {
            if v.is_finite() {
                sum += v;
                n += 1;
            }
        }
    }
    Ok((n > 0).then(|| sum / n as f64))
}

fn fold_score_files(base: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !base.exists() {
        return Ok(files);
    }
    for entry in std::fs::read_dir(base)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(FOLD_SCORE_PREFIX) && name.ends_with(".csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Pick the best iteration under `base`, copy its artifacts and write the model card.
///
/// Ties keep the first file in path order.
pub fn select_best_stacker(base: &Path) -> Result<BestStacker> {
    let files = fold_score_files(base)?;
    if files.is_empty() {
        return Err(BenchError::NoFoldScores(base.to_path_buf()));
    }

    let mut best: Option<(&PathBuf, f64)> = None;
    for file in &files {
        let Some(avg) = column_mean(file, SCORE_COLUMN)? else {
            continue;
        };
        if best.is_none_or(|(_, current)| avg > current) {
            best = Some((file, avg));
        }
    }
    let (best_file, avg_macro_f1) = best.ok_or_else(|| BenchError::NoFoldScores(base.to_path_buf()))?;

    let file_name = best_file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let tag: IterationTag = tag_pattern()
        .captures(file_name)
        .and_then(|c| c.get(1))
        .ok_or_else(|| BenchError::InvalidTag(file_name.to_string()))?
        .as_str()
        .parse()?;
    let tag_str = tag.to_string();

    let mut copied = Vec::new();
    for ext in ["txt", "pkl"] {
        let src = base.join(format!("stacker_best_model_{tag_str}.{ext}"));
        if src.exists() {
            let dst = base.join(format!("stacker_best_model_{ACROSS_ITERATIONS}.{ext}"));
            std::fs::copy(&src, &dst)?;
            copied.push(dst);
        }
    }

    let metrics_prefix = format!("stacker_binary_metrics_{tag_str}_");
    let mut metric_files: Vec<PathBuf> = std::fs::read_dir(base)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&metrics_prefix) && n.ends_with(".csv"))
        })
        .collect();
    metric_files.sort();
    for src in &metric_files {
        let name = src
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .replacen(&tag_str, ACROSS_ITERATIONS, 1);
        let dst = base.join(name);
        std::fs::copy(src, &dst)?;
        copied.push(dst);
    }

    let model_card = base.join(MODEL_CARD_FILE);
    std::fs::write(&model_card, render_model_card(&tag, avg_macro_f1, &copied))?;

    info!(
        tag = %tag,
        avg_macro_f1,
        iterations = files.len(),
        "Best stacking meta-learner selected"
    );

    Ok(BestStacker {
        tag,
        avg_macro_f1,
        iterations_found: files.len(),
        copied,
        model_card,
    })
}

fn render_model_card(tag: &IterationTag, avg: f64, copied: &[PathBuf]) -> String {
    let mut card = String::new();
    card.push_str("# Model Card: Best Stacking Meta-Learner Across Iterations\n\n");
    let _ = writeln!(card, "**Best iteration:** `{tag}`");
    let _ = writeln!(card, "**Average Macro-F1:** {avg:.4}\n");
    card.push_str("## Saved Artifacts\n");
    for path in copied {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            let _ = writeln!(card, "- `{name}`");
        }
    }
    card
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_no_fold_files_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            select_best_stacker(dir.path()),
            Err(BenchError::NoFoldScores(_))
        ));
    }

    #[test]
    fn test_selects_highest_mean_and_copies_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        write(base, "stacker_best_model_folds_iter1.csv", "fold,Macro-F1\n1,0.70\n2,0.72\n");
        write(base, "stacker_best_model_folds_iter2.csv", "fold,Macro-F1\n1,0.80\n2,0.78\n");
        write(base, "stacker_best_model_iter2.txt", "logreg C=1.0");
        write(base, "stacker_binary_metrics_iter2_test.csv", "auc\n0.9\n");
        write(base, "stacker_binary_metrics_iter1_test.csv", "auc\n0.8\n");

        let best = select_best_stacker(base).unwrap();
        assert_eq!(best.tag, IterationTag::new(2));
        assert!((best.avg_macro_f1 - 0.79).abs() < 1e-9);
        assert_eq!(best.iterations_found, 2);

        assert_eq!(
            std::fs::read_to_string(base.join("stacker_best_model_across_iterations.txt")).unwrap(),
            "logreg C=1.0"
        );
        assert!(base.join("stacker_binary_metrics_across_iterations_test.csv").exists());
        assert!(!base.join("stacker_best_model_across_iterations.pkl").exists());

        let card = std::fs::read_to_string(base.join(MODEL_CARD_FILE)).unwrap();
        assert!(card.contains("`iter2`"));
        assert!(card.contains("0.7900"));
        assert!(card.contains("stacker_binary_metrics_across_iterations_test.csv"));
    }

    #[test]
    fn test_missing_score_column() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "stacker_best_model_folds_iter1.csv", "fold,AUC\n1,0.7\n");
        assert!(matches!(
            select_best_stacker(dir.path()),
            Err(BenchError::MissingColumn { .. })
        ));
    }
}
