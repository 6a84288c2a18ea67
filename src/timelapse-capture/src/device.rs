//! Video device enumeration

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{CaptureError, Result};

/// Directory scanned for `video*` device nodes
pub const DEVICE_ROOT: &str = "/dev";

/// Directory holding V4L2 device metadata (human-readable names)
pub const SYSFS_ROOT: &str = "/sys/class/video4linux";

/// Information about a video capture device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device node path, e.g. `/dev/video0`
    pub path: PathBuf,
    /// Numeric suffix of the node name, if any
    pub index: Option<u32>,
    /// Driver-reported name from sysfs, if available
    pub label: Option<String>,
}

impl DeviceInfo {
    /// Device identifier as passed to the capture program
    pub fn id(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Video device discovery
pub struct Device;

impl Device {
    /// Enumerate all `/dev/video*` devices
    pub fn enumerate_all() -> Result<Vec<DeviceInfo>> {
        Self::enumerate_in(Path::new(DEVICE_ROOT), Path::new(SYSFS_ROOT))
    }

    /// Enumerate `video*` entries under `root`, reading labels from `sysfs`.
    ///
    /// Devices are ordered by numeric index so `/dev/video2` sorts before
    /// `/dev/video10`; entries without an index sort last by name.
    pub fn enumerate_in(root: &Path, sysfs: &Path) -> Result<Vec<DeviceInfo>> {
        let entries = fs::read_dir(root).map_err(|source| CaptureError::DeviceDir {
            path: root.to_path_buf(),
            source,
        })?;

        let mut devices = Vec::new();

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(suffix) = name.strip_prefix("video") else {
                continue;
            };

            let label = fs::read_to_string(sysfs.join(&name).join("name"))
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());

            debug!("found device: {} label={:?}", name, label);

            devices.push(DeviceInfo {
                path: entry.path(),
                index: suffix.parse().ok(),
                label,
            });
        }

        devices.sort_by(|a, b| match (a.index, b.index) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.path.cmp(&b.path),
        });

        info!("enumerated {} video devices", devices.len());
        Ok(devices)
    }

    /// Get the first available device
    pub fn get_default() -> Result<DeviceInfo> {
        Self::enumerate_all()?
            .into_iter()
            .next()
            .ok_or(CaptureError::NoDevices)
    }

    /// Look up a device by identifier among the enumerated devices.
    ///
    /// Symlinks such as `/dev/v4l/by-id/...` match the node they point to.
    pub fn find(id: &str) -> Result<DeviceInfo> {
        Self::find_in(Self::enumerate_all()?, id)
    }

    fn find_in(devices: Vec<DeviceInfo>, id: &str) -> Result<DeviceInfo> {
        let resolved = fs::canonicalize(id).ok();
        devices
            .into_iter()
            .find(|d| {
                d.path == Path::new(id)
                    || (resolved.is_some() && fs::canonicalize(&d.path).ok() == resolved)
            })
            .ok_or_else(|| CaptureError::DeviceNotFound(id.to_string()))
    }
}
