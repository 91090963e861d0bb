//! Seed audit over iteration logs.
//!
//! Each iteration log starts with a header carrying `seed=N`. Collaborators
//! may also print their own `seed: N` lines; the first match wins.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::Result;
use crate::iteration::IterationTag;
use crate::planner::ResumePlanner;

fn seed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\bseed\s*[=:]\s*(\d+)").expect("static regex is valid"))
}

/// First seed mentioned in a log body.
pub fn extract_seed(log: &str) -> Option<u64> {
    seed_pattern()
        .captures(log)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Seed found in one iteration's log, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedAudit {
    pub tag: IterationTag,
    pub seed: Option<u64>,
}

/// Audit every `iter{N}.log` in `log_dir`, sorted by index.
pub fn audit_seeds(log_dir: &Path) -> Result<Vec<SeedAudit>> {
    let mut audits = Vec::new();
    for tag in ResumePlanner::tags_from_log_dir(log_dir)? {
        let body = std::fs::read_to_string(log_dir.join(format!("{tag}.log")))?;
        audits.push(SeedAudit {
            seed: extract_seed(&body),
            tag,
        });
    }
    Ok(audits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_seed_variants() {
        assert_eq!(extract_seed("=== iter3 seed=45 device=none ==="), Some(45));
        assert_eq!(extract_seed("Using Seed: 7"), Some(7));
        assert_eq!(extract_seed("no seeds here"), None);
        assert_eq!(extract_seed("reseeded=3"), None);
    }

    #[test]
    fn test_audit_seeds_reads_logs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("iter2.log"), "=== iter2 seed=12 device=0 ===\n").unwrap();
        std::fs::write(dir.path().join("iter1.log"), "crashed before header\n").unwrap();

        let audits = audit_seeds(dir.path()).unwrap();
        assert_eq!(audits.len(), 2);
        assert_eq!(audits[0].tag, IterationTag::new(1));
        assert_eq!(audits[0].seed, None);
        assert_eq!(audits[1].seed, Some(12));
    }
}
