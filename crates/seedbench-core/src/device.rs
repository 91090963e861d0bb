//! Accelerator detection.
//!
//! Queried once per batch. Having no accelerator is a supported mode, so every
//! probe failure degrades to [`Device::None`].

use tokio::process::Command;
use tracing::{debug, info};

use crate::iteration::Device;

/// Probe command: prints one GPU index per line.
pub const NVIDIA_SMI_QUERY: [&str; 3] = ["nvidia-smi", "--query-gpu=index", "--format=csv,noheader"];

/// First usable accelerator reported by `nvidia-smi`, or `Device::None`.
pub async fn detect_device() -> Device {
    let [exe, args @ ..] = NVIDIA_SMI_QUERY;
    detect_with(exe, &args).await
}

/// Run `exe args...` and take the first non-empty line of stdout as the device id.
pub async fn detect_with(exe: &str, args: &[&str]) -> Device {
    let output = match Command::new(exe).args(args).output().await {
        Ok(output) => output,
        Err(e) => {
            debug!(probe = %exe, error = %e, "device probe unavailable");
            info!("No accelerator detected, running unaccelerated");
            return Device::None;
        }
    };

    if !output.status.success() {
        debug!(probe = %exe, status = ?output.status.code(), "device probe failed");
        info!("No accelerator detected, running unaccelerated");
        return Device::None;
    }

    let device = parse_probe_output(&String::from_utf8_lossy(&output.stdout));
    info!(device = %device, "Accelerator probe finished");
    device
}

/// Parse probe stdout into at most one device.
pub fn parse_probe_output(stdout: &str) -> Device {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map_or(Device::None, |id| Device::Gpu(id.to_string()))
}

/// Resolve the batch device: explicit override wins, otherwise probe.
pub async fn resolve_device(override_device: Option<Device>) -> Device {
    match override_device {
        Some(device) => {
            info!(device = %device, "Using configured device");
            device
        }
        None => detect_device().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_line() {
        assert_eq!(parse_probe_output("0\n1\n"), Device::Gpu("0".to_string()));
        assert_eq!(parse_probe_output("\n  2 \n"), Device::Gpu("2".to_string()));
        assert_eq!(parse_probe_output(""), Device::None);
    }

    #[tokio::test]
    async fn test_missing_probe_means_no_device() {
        let device = detect_with("seedbench-no-such-probe-binary", &[]).await;
        assert_eq!(device, Device::None);
    }

    #[tokio::test]
    async fn test_failing_probe_means_no_device() {
        let device = detect_with("false", &[]).await;
        assert_eq!(device, Device::None);
    }

    #[tokio::test]
    async fn test_probe_output_is_used() {
        let device = detect_with("echo", &["3"]).await;
        assert_eq!(device, Device::Gpu("3".to_string()));
    }

    #[tokio::test]
    async fn test_override_skips_probe() {
        let device = resolve_device(Some(Device::None)).await;
        assert_eq!(device, Device::None);
    }
}
