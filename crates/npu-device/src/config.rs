//! Filesystem roots for the sysfs topology source
//!
//! Defaults point at the live system. `NPU_DEVFS`, `NPU_SYSFS` and
//! `NPU_PROCFS` redirect them, which is how fixture trees and containers
//! with remapped mounts are inspected.

use std::path::PathBuf;

/// Environment variable overriding the devfs root.
pub const DEVFS_ENV: &str = "NPU_DEVFS";
/// Environment variable overriding the sysfs root.
pub const SYSFS_ENV: &str = "NPU_SYSFS";
/// Environment variable overriding the procfs root.
pub const PROCFS_ENV: &str = "NPU_PROCFS";

/// Where the sysfs source looks for device files, attributes and processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Device file root (`/dev`)
    pub devfs: PathBuf,
    /// Management attribute root (`/sys`)
    pub sysfs: PathBuf,
    /// Process table root (`/proc`)
    pub procfs: PathBuf,
    /// Only accept character devices as device files
    pub require_char_devices: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            devfs: PathBuf::from("/dev"),
            sysfs: PathBuf::from("/sys"),
            procfs: PathBuf::from("/proc"),
            require_char_devices: true,
        }
    }
}

impl SourceConfig {
    /// Defaults, with roots overridden by the environment where set.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(devfs) = std::env::var_os(DEVFS_ENV) {
            config.devfs = PathBuf::from(devfs);
        }
        if let Some(sysfs) = std::env::var_os(SYSFS_ENV) {
            config.sysfs = PathBuf::from(sysfs);
        }
        if let Some(procfs) = std::env::var_os(PROCFS_ENV) {
            config.procfs = PathBuf::from(procfs);
        }

        tracing::debug!(
            "source roots: devfs={} sysfs={} procfs={}",
            config.devfs.display(),
            config.sysfs.display(),
            config.procfs.display()
        );
        config
    }

    /// Config rooted at a fixture tree containing `dev/`, `sys/` and `proc/`.
    ///
    /// Plain files are accepted as device files.
    #[must_use]
    pub fn fixture(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            devfs: root.join("dev"),
            sysfs: root.join("sys"),
            procfs: root.join("proc"),
            require_char_devices: false,
        }
    }
}
