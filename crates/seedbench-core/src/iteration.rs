//! Iteration identity and outcome types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BenchError;

/// Prefix shared by every iteration tag (`iter1`, `iter2`, ...).
pub const TAG_PREFIX: &str = "iter";

/// String identity of an iteration, e.g. `iter7`.
///
/// Always constructed from an index, or validated by [`FromStr`], so the numeric
/// suffix can be recovered without re-parsing failures downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IterationTag(u32);

impl IterationTag {
    /// Tag for iteration `index`.
    pub fn new(index: u32) -> Self {
        IterationTag(index)
    }

    /// Numeric index of this tag.
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for IterationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", TAG_PREFIX, self.0)
    }
}

impl FromStr for IterationTag {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix(TAG_PREFIX)
            .ok_or_else(|| BenchError::InvalidTag(s.to_string()))?;
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(BenchError::InvalidTag(s.to_string()));
        }
        digits
            .parse::<u32>()
            .map(IterationTag)
            .map_err(|_| BenchError::InvalidTag(s.to_string()))
    }
}

impl TryFrom<String> for IterationTag {
    type Error = BenchError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IterationTag> for String {
    fn from(tag: IterationTag) -> Self {
        tag.to_string()
    }
}

/// Accelerator assigned to a batch. Detected once, static for every iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    /// Unaccelerated execution.
    #[default]
    None,
    /// GPU index as reported by the device probe.
    Gpu(String),
}

impl Device {
    /// Value exported to collaborators as `CUDA_VISIBLE_DEVICES`.
    pub fn visible_devices(&self) -> &str {
        match self {
            Device::None => "",
            Device::Gpu(id) => id,
        }
    }

    pub fn is_accelerated(&self) -> bool {
        matches!(self, Device::Gpu(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::None => f.write_str("none"),
            Device::Gpu(id) => f.write_str(id),
        }
    }
}

impl FromStr for Device {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            Ok(Device::None)
        } else {
            Ok(Device::Gpu(trimmed.to_string()))
        }
    }
}

/// Everything a single iteration needs to know about itself.
///
/// Built once per iteration by the batch controller and passed by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationContext {
    pub index: u32,
    pub seed: u64,
    pub tag: IterationTag,
    pub device: Device,
    pub total: u32,
}

impl IterationContext {
    /// Derive the identity of iteration `index`; `seed = index + seed_offset`.
    pub fn new(index: u32, total: u32, seed_offset: u64, device: Device) -> Self {
        Self {
            index,
            seed: u64::from(index) + seed_offset,
            tag: IterationTag::new(index),
            device,
            total,
        }
    }
}

/// Lifecycle of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl IterationStatus {
    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IterationStatus::Succeeded | IterationStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IterationStatus::Pending => "pending",
            IterationStatus::Running => "running",
            IterationStatus::Succeeded => "succeeded",
            IterationStatus::Failed => "failed",
        }
    }
}

/// Result of executing one iteration, propagated through ordinary control flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IterationOutcome {
    Succeeded,
    Failed {
        /// Stage in which the first failure happened.
        stage: String,
        reason: String,
        /// Exit code of the failing job, `None` when it never produced one.
        exit_code: Option<i32>,
    },
}

impl IterationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, IterationOutcome::Succeeded)
    }

    pub fn status(&self) -> IterationStatus {
        match self {
            IterationOutcome::Succeeded => IterationStatus::Succeeded,
            IterationOutcome::Failed { .. } => IterationStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_display_and_parse() {
        let tag = IterationTag::new(7);
        assert_eq!(tag.to_string(), "iter7");
        assert_eq!("iter7".parse::<IterationTag>().unwrap(), tag);
        assert_eq!("iter12".parse::<IterationTag>().unwrap().index(), 12);
    }

    #[test]
    fn test_tag_rejects_malformed() {
        assert!("iter".parse::<IterationTag>().is_err());
        assert!("iterX".parse::<IterationTag>().is_err());
        assert!("run3".parse::<IterationTag>().is_err());
        assert!("iter-1".parse::<IterationTag>().is_err());
        assert!("iter1.log".parse::<IterationTag>().is_err());
    }

    #[test]
    fn test_context_derives_seed_from_offset() {
        let ctx = IterationContext::new(3, 5, 100, Device::None);
        assert_eq!(ctx.seed, 103);
        assert_eq!(ctx.tag.to_string(), "iter3");
        assert_eq!(ctx.total, 5);
    }

    #[test]
    fn test_device_parse() {
        assert_eq!("none".parse::<Device>().unwrap(), Device::None);
        assert_eq!("".parse::<Device>().unwrap(), Device::None);
        assert_eq!(" 0 ".parse::<Device>().unwrap(), Device::Gpu("0".to_string()));
        assert_eq!(Device::Gpu("1".to_string()).visible_devices(), "1");
        assert_eq!(Device::None.visible_devices(), "");
    }

    #[test]
    fn test_outcome_status() {
        assert_eq!(IterationOutcome::Succeeded.status(), IterationStatus::Succeeded);
        let failed = IterationOutcome::Failed {
            stage: "gpu_models".to_string(),
            reason: "exit 1".to_string(),
            exit_code: Some(1),
        };
        assert!(!failed.is_success());
        assert!(failed.status().is_terminal());
        assert!(!IterationStatus::Running.is_terminal());
    }
}
