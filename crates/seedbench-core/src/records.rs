//! Run Record Store: the append-only log of per-iteration execution windows.
//!
//! The store is the single source of truth for "did iteration `i` complete".
//! Records are appended once per iteration attempt that reached completion,
//! success or failure, and never rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::error::{BenchError, Result};
use crate::iteration::{Device, IterationTag};

/// Column order of the on-disk record file.
pub const RUN_RECORD_HEADER: [&str; 5] = [
    "iteration",
    "start_time",
    "end_time",
    "duration_sec",
    "gpu_id",
];

/// One completed iteration attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    #[serde(rename = "iteration")]
    pub iteration_tag: IterationTag,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_sec: u64,
    /// Device id, `none` for unaccelerated iterations.
    pub gpu_id: String,
}

impl RunRecord {
    /// Build a record for an execution window. Duration is clamped at zero.
    pub fn new(
        iteration_tag: IterationTag,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        device: &Device,
    ) -> Self {
        let duration_sec = (end_time - start_time).num_seconds().max(0) as u64;
        Self {
            iteration_tag,
            start_time,
            end_time,
            duration_sec,
            gpu_id: device.to_string(),
        }
    }
}

/// Append-only store for [`RunRecord`]s.
///
/// Guarantees:
/// - `append` never mutates or removes existing records.
/// - `load_all` returns records in append order.
/// - A store that has never been written to yields zero records.
pub trait RunRecordStore: Send + Sync {
    /// Append one record.
    fn append(&self, record: &RunRecord) -> Result<()>;

    /// All records, in append order.
    fn load_all(&self) -> Result<Vec<RunRecord>>;

    /// Persist everything appended so far to durable storage.
    fn sync(&self) -> Result<()>;

    /// Tags of every recorded iteration, in append order.
    fn recorded_tags(&self) -> Result<Vec<IterationTag>> {
        Ok(self
            .load_all()?
            .into_iter()
            .map(|r| r.iteration_tag)
            .collect())
    }
}

/// CSV-backed store with the fixed five-column header.
pub struct CsvRunRecordStore {
    path: PathBuf,
}

impl CsvRunRecordStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupt(&self, reason: impl ToString) -> BenchError {
        BenchError::CorruptRecords {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

impl RunRecordStore for CsvRunRecordStore {
    fn append(&self, record: &RunRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let write_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<RunRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        if headers.iter().ne(RUN_RECORD_HEADER.iter().copied()) {
            return Err(self.corrupt(format!("unexpected header {:?}", headers)));
        }

        reader
            .deserialize()
            .map(|row| row.map_err(|e| self.corrupt(e)))
            .collect()
    }

    fn sync(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let file = OpenOptions::new().append(true).open(&self.path)?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(index: u32, secs: i64) -> RunRecord {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let end = start + chrono::Duration::seconds(secs);
        RunRecord::new(IterationTag::new(index), start, end, &Device::None)
    }

    #[test]
    fn test_missing_file_yields_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvRunRecordStore::new(dir.path().join("iteration_runs.csv"));
        assert!(store.load_all().unwrap().is_empty());
        store.sync().expect("sync on missing file is a no-op");
    }

    #[test]
    fn test_append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iteration_runs.csv");
        let store = CsvRunRecordStore::new(&path);

        store.append(&record(1, 30)).unwrap();
        store.append(&record(2, 45)).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "iteration,start_time,end_time,duration_sec,gpu_id");
        assert!(lines[1].starts_with("iter1,"));
        assert!(lines[2].ends_with(",45,none"));
    }

    #[test]
    fn test_load_preserves_append_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvRunRecordStore::new(dir.path().join("runs.csv"));
        for index in [1, 3, 4] {
            store.append(&record(index, 10)).unwrap();
        }

        let tags: Vec<String> = store
            .recorded_tags()
            .unwrap()
            .iter()
            .map(|t| t.to_string())
            .collect();
        assert_eq!(tags, vec!["iter1", "iter3", "iter4"]);
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvRunRecordStore::new(dir.path().join("nested/deeper/runs.csv"));
        store.append(&record(1, 1)).unwrap();
        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_wrong_header_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.csv");
        std::fs::write(&path, "tag,elapsed\niter1,3\n").unwrap();
        let store = CsvRunRecordStore::new(&path);
        assert!(matches!(
            store.load_all(),
            Err(BenchError::CorruptRecords { .. })
        ));
    }

    #[test]
    fn test_duration_never_negative() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let end = start - chrono::Duration::seconds(5);
        let rec = RunRecord::new(IterationTag::new(1), start, end, &Device::Gpu("0".into()));
        assert_eq!(rec.duration_sec, 0);
        assert_eq!(rec.gpu_id, "0");
    }
}
