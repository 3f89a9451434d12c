//! Linux topology source (devfs + sysfs + procfs)
//!
//! Device files are discovered under devfs (`/dev/npu*`, `/dev/rngd/npu*`),
//! identity and attributes come from the family's management directory in
//! sysfs, and lock holders are the processes whose fd table points at a
//! device file. Nothing is cached; every call walks the filesystem again.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use npu_chip::{mgmt, Arch, ALL_ARCHS};
use rustix::fs::FileType;
use rustix::io::Errno;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::counters::PerformanceCounterHandle;
use crate::error::{DeviceError, Result};
use crate::hwmon::{self, SensorReading};
use crate::naming;
use crate::occupancy::OwnerId;
use crate::proc;
use crate::source::{DeviceAttribute, DeviceFacts, TopologySource};
use crate::topology::DeviceFile;

/// Topology source reading the live (or a fixture) filesystem.
#[derive(Debug, Clone, Default)]
pub struct SysfsSource {
    config: SourceConfig,
}

impl SysfsSource {
    /// Source rooted where `config` says.
    #[must_use]
    pub const fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    /// Source rooted at the live system, honoring environment overrides.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(SourceConfig::from_env())
    }

    /// Roots this source reads.
    #[must_use]
    pub const fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn family_dir(&self, arch: Arch) -> PathBuf {
        match arch.devfs_subdir() {
            Some(sub) => self.config.devfs.join(sub),
            None => self.config.devfs.clone(),
        }
    }

    fn mgmt_path(&self, arch: Arch, index: u8, file: &str) -> PathBuf {
        self.config.sysfs.join(arch.mgmt_dir(index)).join(file)
    }

    /// Device files of one family, grouped by device index.
    fn scan_family(&self, arch: Arch) -> Result<BTreeMap<u8, Vec<DeviceFile>>> {
        let dir = self.family_dir(arch);
        let mut grouped: BTreeMap<u8, Vec<DeviceFile>> = BTreeMap::new();

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(grouped),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Ok(parsed) = naming::parse_name(name) else {
                continue;
            };
            if !self.is_device_node(&entry.path())? {
                debug!("{}: not a character device, skipped", entry.path().display());
                continue;
            }

            grouped
                .entry(parsed.device_index)
                .or_default()
                .push(DeviceFile::from_name(&dir, name)?);
        }

        Ok(grouped)
    }

    fn is_device_node(&self, path: &Path) -> Result<bool> {
        if !self.config.require_char_devices {
            return Ok(!path.is_dir());
        }
        let st = rustix::fs::stat(path).map_err(io::Error::from)?;
        Ok(FileType::from_raw_mode(st.st_mode) == FileType::CharacterDevice)
    }

    /// Whether `arch`'s management dir has device `index` on a vendor platform.
    ///
    /// A missing `platform_type` means no; any other read failure is an error.
    fn is_vendor_device(&self, arch: Arch, index: u8) -> Result<bool> {
        match std::fs::read_to_string(self.mgmt_path(arch, index, mgmt::PLATFORM_TYPE)) {
            Ok(contents) => Ok(mgmt::is_vendor_platform(&contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(classify_read_error(e, index)),
        }
    }

    fn read_mgmt(&self, arch: Arch, index: u8, file: &str) -> Result<String> {
        read_sysfs(&self.mgmt_path(arch, index, file), file, index)
    }

    /// Facts of device `index` found in family `arch`.
    fn facts(&self, arch: Arch, index: u8) -> Result<DeviceFacts> {
        let device_type = self.read_mgmt(arch, index, mgmt::DEVICE_TYPE)?;
        let soc_rev = self.read_mgmt(arch, index, mgmt::SOC_REV)?;
        let reported = Arch::from_platform(&device_type, &soc_rev)?;

        if reported != arch {
            return Err(DeviceError::incompatible_driver(format!(
                "npu{index} reports {reported} but is managed as {arch}"
            )));
        }

        Ok(DeviceFacts {
            index,
            arch,
            core_num: arch.core_count(),
        })
    }

    /// Family of a device index, or `DeviceNotFound`.
    fn locate(&self, index: u8) -> Result<Arch> {
        for &arch in ALL_ARCHS {
            if self.is_vendor_device(arch, index)? {
                return Ok(arch);
            }
        }
        Err(DeviceError::device_not_found(format!("npu{index}")))
    }
}

fn read_sysfs(path: &Path, attribute: &str, index: u8) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            debug!("{}: {:?}", path.display(), contents.trim());
            Ok(contents.trim().to_string())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(DeviceError::unsupported(attribute)),
        Err(e) => Err(classify_read_error(e, index)),
    }
}

/// `EBUSY` means the driver is mid-update; everything else passes through.
fn classify_read_error(e: io::Error, index: u8) -> DeviceError {
    if e.raw_os_error() == Some(Errno::BUSY.raw_os_error()) {
        DeviceError::device_busy(format!("npu{index}"))
    } else {
        e.into()
    }
}

impl TopologySource for SysfsSource {
    fn enumerate_devices(&self) -> Result<Vec<DeviceFacts>> {
        match std::fs::metadata(&self.config.devfs) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DeviceError::device_not_found(
                    self.config.devfs.display().to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        let mut found: BTreeMap<u8, DeviceFacts> = BTreeMap::new();

        for &arch in ALL_ARCHS {
            for index in self.scan_family(arch)?.into_keys() {
                if !self.is_vendor_device(arch, index)? {
                    warn!("npu{index}: {arch} device files without a vendor platform, skipped");
                    continue;
                }

                let facts = self.facts(arch, index)?;
                if let Some(previous) = found.insert(index, facts) {
                    return Err(DeviceError::unexpected_value(format!(
                        "npu{index} exposed by both {} and {arch}",
                        previous.arch
                    )));
                }
            }
        }

        info!("Found {} NPU device(s)", found.len());
        Ok(found.into_values().collect())
    }

    fn read_device_file_list(&self, device_index: u8) -> Result<Vec<DeviceFile>> {
        let arch = self.locate(device_index)?;
        Ok(self
            .scan_family(arch)?
            .remove(&device_index)
            .unwrap_or_default())
    }

    fn is_alive(&self, device_index: u8) -> Result<bool> {
        let arch = self.locate(device_index)?;
        match self.read_mgmt(arch, device_index, mgmt::ALIVE)?.as_str() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(DeviceError::unexpected_value(format!(
                "npu{device_index}: alive is {other:?}, expected 0 or 1"
            ))),
        }
    }

    fn read_lock_holders(
        &self,
        _device_index: u8,
        files: &[DeviceFile],
    ) -> Result<BTreeMap<PathBuf, OwnerId>> {
        let mut holders = BTreeMap::new();

        // Targets come sorted by pid; the lowest pid wins a shared file
        for (pid, target) in proc::scan_fd_targets(&self.config.procfs)? {
            if let Some(file) = files.iter().find(|f| f.path() == target) {
                holders
                    .entry(file.path().to_path_buf())
                    .or_insert_with(|| OwnerId::pid(pid));
            }
        }

        Ok(holders)
    }

    fn read_attribute(&self, device_index: u8, attribute: DeviceAttribute) -> Result<String> {
        let arch = self.locate(device_index)?;

        if attribute == DeviceAttribute::NumaNode {
            let busname = self.read_mgmt(arch, device_index, mgmt::BUSNAME)?;
            let path = self
                .config
                .sysfs
                .join(mgmt::pci_device_dir(&busname))
                .join(attribute.name());
            return read_sysfs(&path, attribute.name(), device_index);
        }

        self.read_mgmt(arch, device_index, attribute.name())
    }

    fn read_performance_counter(
        &self,
        file: &DeviceFile,
    ) -> Result<Option<PerformanceCounterHandle>> {
        let path = self.config.sysfs.join(mgmt::perf_regs_path(file.filename()));

        match std::fs::File::open(&path) {
            Ok(_) => Ok(Some(PerformanceCounterHandle::new(
                file.filename(),
                path.display().to_string(),
            ))),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn read_sensors(&self, device_index: u8) -> Result<Vec<SensorReading>> {
        let busname = self.read_attribute(device_index, DeviceAttribute::PciBusName)?;
        let pci_dir = self.config.sysfs.join(mgmt::pci_device_dir(&busname));
        hwmon::read_sensors(&hwmon::find_hwmon_dir(&pci_dir)?)
    }
}
