use std::path::{Path, PathBuf};

use tracing::{debug, info};
use v4l::capability::Flags;
use v4l::Device;

/// Driver name reported by the v4l2loopback module
const LOOPBACK_DRIVER: &str = "v4l2 loopback";

/// List v4l2loopback output devices, sorted by path
pub fn find_loopback_devices() -> Vec<PathBuf> {
    let mut devices: Vec<PathBuf> = std::fs::read_dir("/dev")
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("video"))
        })
        .filter(|path| is_loopback_device(path))
        .collect();

    devices.sort_by_key(|path| video_index(path));
    devices
}

/// First loopback device on the system, if any
pub fn default_loopback_device() -> Option<PathBuf> {
    info!("Auto-detecting v4l2loopback devices...");

    let device = find_loopback_devices().into_iter().next();
    match &device {
        Some(path) => info!("Found loopback device: {}", path.display()),
        None => info!("No loopback device found"),
    }
    device
}

fn is_loopback_device(path: &Path) -> bool {
    let Ok(dev) = Device::with_path(path) else {
        return false;
    };
    let Ok(caps) = dev.query_caps() else {
        return false;
    };

    debug!("{}: {} ({})", path.display(), caps.card, caps.driver);
    caps.capabilities.contains(Flags::VIDEO_OUTPUT) && caps.driver.contains(LOOPBACK_DRIVER)
}

/// Numeric suffix of `/dev/videoN`, so video2 sorts before video10
fn video_index(path: &Path) -> (u32, PathBuf) {
    let index = path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_prefix("video"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(u32::MAX);
    (index, path.to_path_buf())
}
