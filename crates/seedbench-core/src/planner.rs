//! Resume planning.
//!
//! The planner resumes after the highest iteration index ever observed. It
//! never fills gaps and never retries an iteration that left a trace, so an
//! index is attempted at most once per batch directory.

use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::iteration::IterationTag;

/// Where a batch should pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePlan {
    /// Next iteration index to run.
    Next(u32),
    /// Every configured iteration has already been attempted.
    Complete,
}

impl ResumePlan {
    pub fn next_index(&self) -> Option<u32> {
        match self {
            ResumePlan::Next(i) => Some(*i),
            ResumePlan::Complete => None,
        }
    }
}

/// Computes the resume point from previously observed iteration tags.
pub struct ResumePlanner;

impl ResumePlanner {
    /// Smallest index strictly above every observed index; `1` when nothing was observed.
    pub fn next_index<'a, I>(observed: I) -> u32
    where
        I: IntoIterator<Item = &'a IterationTag>,
    {
        observed
            .into_iter()
            .map(IterationTag::index)
            .max()
            .map_or(1, |m| m.saturating_add(1))
    }

    /// Resume plan against the configured total.
    pub fn plan<'a, I>(observed: I, total: u32) -> ResumePlan
    where
        I: IntoIterator<Item = &'a IterationTag>,
    {
        let next = Self::next_index(observed);
        if next > total {
            ResumePlan::Complete
        } else {
            ResumePlan::Next(next)
        }
    }

    /// Parse raw tag strings, skipping anything that is not `iter{N}`.
    pub fn parse_tags<'a, I>(raw: I) -> Vec<IterationTag>
    where
        I: IntoIterator<Item = &'a str>,
    {
        raw.into_iter()
            .filter_map(|s| match s.parse::<IterationTag>() {
                Ok(tag) => Some(tag),
                Err(_) => {
                    debug!(tag = %s, "ignoring unparsable iteration tag");
                    None
                }
            })
            .collect()
    }

    /// Tags of every `iter{N}.log` file in `log_dir`. A missing directory yields none.
    pub fn tags_from_log_dir(log_dir: &Path) -> Result<Vec<IterationTag>> {
        if !log_dir.exists() {
            return Ok(Vec::new());
        }

        let mut stems = Vec::new();
        for entry in std::fs::read_dir(log_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }

        let mut tags = Self::parse_tags(stems.iter().map(String::as_str));
        tags.sort();
        Ok(tags)
    }
}
