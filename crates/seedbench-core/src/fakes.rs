//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryRunRecordStore`, which satisfies the [`RunRecordStore`]
//! contract without touching the filesystem.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::Result;
use crate::records::{RunRecord, RunRecordStore};

/// In-memory run record store backed by a `Vec<RunRecord>`.
#[derive(Debug, Default)]
pub struct MemoryRunRecordStore {
    records: Mutex<Vec<RunRecord>>,
    syncs: AtomicUsize,
}

impl MemoryRunRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate with existing records (simulates a restart).
    pub fn with_records(records: Vec<RunRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            syncs: AtomicUsize::new(0),
        }
    }

    /// Number of times `sync` was called.
    pub fn sync_count(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RunRecordStore for MemoryRunRecordStore {
    fn append(&self, record: &RunRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<RunRecord>> {
        Ok(self.records.lock().unwrap().clone())
    }

    fn sync(&self) -> Result<()> {
        self.syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
