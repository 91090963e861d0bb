//! Per-iteration resource usage log.
//!
//! One row per iteration: wall-clock hours, GPU hours (wall-clock when an
//! accelerator was assigned), host CPU load and disk usage sampled when the
//! iteration ends, and the iteration outcome.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{Disks, System};

use crate::error::Result;
use crate::iteration::{Device, IterationOutcome, IterationTag};

/// Host load at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemSample {
    /// Global CPU usage across all cores, in percent.
    pub cpu_pct: f64,
    /// Used space in GB (10^9 bytes) on the filesystem holding the sampled path.
    pub disk_used_gb: f64,
}

impl SystemSample {
    /// Sample CPU usage and the disk usage of the filesystem that holds `path`.
    ///
    /// CPU usage needs two refreshes at least
    /// [`sysinfo::MINIMUM_CPU_UPDATE_INTERVAL`] apart. A path on no known
    /// mount reports `0.0` disk usage.
    pub async fn capture(path: &Path) -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        system.refresh_cpu_usage();

        let disks = Disks::new_with_refreshed_list();
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let disk_used_gb = disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.total_space().saturating_sub(disk.available_space()) as f64 / 1e9)
            .unwrap_or(0.0);

        Self {
            cpu_pct: f64::from(system.global_cpu_usage()),
            disk_used_gb,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub tag: IterationTag,
    pub elapsed_hr: f64,
    pub gpu_hrs: f64,
    pub cpu_pct: f64,
    pub disk_used_gb: f64,
    pub status: String,
}

impl ResourceUsage {
    pub fn new(
        tag: IterationTag,
        elapsed: Duration,
        device: &Device,
        outcome: &IterationOutcome,
        sample: SystemSample,
    ) -> Self {
        let elapsed_hr = round(elapsed.as_secs_f64() / 3600.0, 3);
        Self {
            tag,
            elapsed_hr,
            gpu_hrs: if device.is_accelerated() { elapsed_hr } else { 0.0 },
            cpu_pct: round(sample.cpu_pct, 1),
            disk_used_gb: round(sample.disk_used_gb, 1),
            status: outcome.status().as_str().to_string(),
        }
    }
}

fn round(v: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (v * scale).round() / scale
}

/// Append-only CSV of [`ResourceUsage`] rows.
pub struct ResourceLog {
    path: PathBuf,
}

impl ResourceLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Append a row, writing the header on first use.
    pub fn append(&self, usage: &ResourceUsage) -> Result<()> {
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
        writer.serialize(usage)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_all(&self) -> Result<Vec<ResourceUsage>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let rows = reader.deserialize().collect::<std::result::Result<_, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_hours_follow_device() {
        let elapsed = Duration::from_secs(5400);
        let gpu = ResourceUsage::new(
            IterationTag::new(1),
            elapsed,
            &Device::Gpu("0".to_string()),
            &IterationOutcome::Succeeded,
            SystemSample::default(),
        );
        assert_eq!(gpu.elapsed_hr, 1.5);
        assert_eq!(gpu.gpu_hrs, 1.5);
        assert_eq!(gpu.status, "succeeded");

        let cpu = ResourceUsage::new(
            IterationTag::new(1),
            elapsed,
            &Device::None,
            &IterationOutcome::Succeeded,
            SystemSample::default(),
        );
        assert_eq!(cpu.gpu_hrs, 0.0);
    }

    #[test]
    fn test_append_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let log = ResourceLog::new(dir.path().join("resource_usage.csv"));
        let failed = IterationOutcome::Failed {
            stage: "gpu".to_string(),
            reason: "exit 1".to_string(),
            exit_code: Some(1),
        };
        log.append(&ResourceUsage::new(
            IterationTag::new(1),
            Duration::from_secs(36),
            &Device::None,
            &IterationOutcome::Succeeded,
            SystemSample {
                cpu_pct: 37.46,
                disk_used_gb: 120.04,
            },
        ))
        .unwrap();
        log.append(&ResourceUsage::new(
            IterationTag::new(2),
            Duration::from_secs(72),
            &Device::None,
            &failed,
            SystemSample::default(),
        ))
        .unwrap();

        let rows = log.load_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].elapsed_hr, 0.01);
        assert_eq!(rows[0].cpu_pct, 37.5);
        assert_eq!(rows[0].disk_used_gb, 120.0);
        assert_eq!(rows[1].status, "failed");

        let raw = std::fs::read_to_string(dir.path().join("resource_usage.csv")).unwrap();
        assert_eq!(
            raw.lines().next(),
            Some("tag,elapsed_hr,gpu_hrs,cpu_pct,disk_used_gb,status")
        );
    }

    #[tokio::test]
    async fn test_capture_reports_host_load() {
        let dir = tempfile::tempdir().unwrap();
        let sample = SystemSample::capture(dir.path()).await;
        assert!(sample.cpu_pct >= 0.0);
        assert!(sample.disk_used_gb >= 0.0);
        assert!(sample.cpu_pct.is_finite());
    }
}
