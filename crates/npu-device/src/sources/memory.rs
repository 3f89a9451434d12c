//! In-memory topology source
//!
//! Holds a whole device population in memory and lets tests (and tools that
//! replay captured state) mutate lock holders, liveness, attributes and
//! counter bindings at runtime. Clones share state, so a clone kept by the
//! caller can drive a source already handed to a registry.
//!
//! ```
//! use npu_device::sources::{MemoryDevice, MemorySource};
//! use npu_device::{Arch, CoreStatus, DeviceRegistry, OwnerId};
//!
//! # fn main() -> npu_device::Result<()> {
//! let source = MemorySource::new().with_device(
//!     MemoryDevice::new(0, Arch::Warboy, 2).with_files(["npu0", "npu0pe0", "npu0pe1"])?,
//! );
//! let registry = DeviceRegistry::new(source.clone());
//!
//! source.hold(0, "npu0pe1", OwnerId::pid(4242))?;
//! let device = registry.get_device(0)?;
//! assert_eq!(device.core_status(1)?, CoreStatus::Occupied);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use npu_chip::Arch;
use parking_lot::RwLock;
use tracing::debug;

use crate::counters::PerformanceCounterHandle;
use crate::error::{DeviceError, Result};
use crate::hwmon::SensorReading;
use crate::occupancy::{LockTable, OwnerId};
use crate::source::{DeviceAttribute, DeviceFacts, TopologySource};
use crate::topology::DeviceFile;

/// One device held by a [`MemorySource`].
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    facts: DeviceFacts,
    files: Vec<DeviceFile>,
    alive: bool,
    holders: BTreeMap<PathBuf, OwnerId>,
    attributes: BTreeMap<DeviceAttribute, String>,
    counters: BTreeMap<PathBuf, PerformanceCounterHandle>,
    sensors: Option<Vec<SensorReading>>,
}

impl MemoryDevice {
    /// An alive device with no device files yet.
    ///
    /// `core_num` may be below what `arch` has, as on a partially enabled
    /// part; a registry rejects anything above.
    #[must_use]
    pub fn new(index: u8, arch: Arch, core_num: u8) -> Self {
        Self {
            facts: DeviceFacts {
                index,
                arch,
                core_num,
            },
            files: Vec::new(),
            alive: true,
            holders: BTreeMap::new(),
            attributes: BTreeMap::new(),
            counters: BTreeMap::new(),
            sensors: None,
        }
    }

    /// Add a device file as is. Nothing is validated until a registry reads it.
    #[must_use]
    pub fn with_file(mut self, file: DeviceFile) -> Self {
        self.files.push(file);
        self
    }

    /// Add device files by name, placed where the architecture keeps them
    /// (`/dev/npu0pe0`, `/dev/rngd/npu0pe0`).
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::InvalidInput` for a name outside the device file grammar.
    pub fn with_files<I, S>(mut self, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let dir = self.file_dir();
        for name in names {
            self.files.push(DeviceFile::from_name(&dir, name.as_ref())?);
        }
        Ok(self)
    }

    /// Set an attribute before the device is added.
    #[must_use]
    pub fn with_attribute(mut self, attribute: DeviceAttribute, value: impl Into<String>) -> Self {
        self.attributes.insert(attribute, value.into());
        self
    }

    fn file_dir(&self) -> PathBuf {
        let root = Path::new("/dev");
        match self.facts.arch.devfs_subdir() {
            Some(sub) => root.join(sub),
            None => root.to_path_buf(),
        }
    }

    fn file(&self, name: &str) -> Result<&DeviceFile> {
        self.files
            .iter()
            .find(|f| f.filename() == name)
            .ok_or_else(|| DeviceError::device_not_found(name))
    }
}

#[derive(Debug, Default)]
struct State {
    devices: BTreeMap<u8, MemoryDevice>,
    unreachable: bool,
}

impl State {
    fn device(&self, index: u8) -> Result<&MemoryDevice> {
        self.devices
            .get(&index)
            .ok_or_else(|| DeviceError::device_not_found(format!("npu{index}")))
    }

    fn device_mut(&mut self, index: u8) -> Result<&mut MemoryDevice> {
        self.devices
            .get_mut(&index)
            .ok_or_else(|| DeviceError::device_not_found(format!("npu{index}")))
    }
}

/// Topology source backed by process memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    state: Arc<RwLock<State>>,
}

impl MemorySource {
    /// An empty, reachable source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a device.
    #[must_use]
    pub fn with_device(self, device: MemoryDevice) -> Self {
        self.state.write().devices.insert(device.facts.index, device);
        self
    }

    /// Mark `file_name` of device `index` as locked by `owner`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::DeviceNotFound` for an unknown device or file.
    pub fn hold(&self, index: u8, file_name: &str, owner: OwnerId) -> Result<()> {
        let mut state = self.state.write();
        let device = state.device_mut(index)?;
        let path = device.file(file_name)?.path().to_path_buf();
        debug!("memory source: {} held by {owner}", path.display());
        device.holders.insert(path, owner);
        Ok(())
    }

    /// Drop the lock on `file_name` of device `index`, if any.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::DeviceNotFound` for an unknown device or file.
    pub fn release(&self, index: u8, file_name: &str) -> Result<()> {
        let mut state = self.state.write();
        let device = state.device_mut(index)?;
        let path = device.file(file_name)?.path().to_path_buf();
        device.holders.remove(&path);
        Ok(())
    }

    /// Set the liveness flag of device `index`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::DeviceNotFound` for an unknown device.
    pub fn set_alive(&self, index: u8, alive: bool) -> Result<()> {
        self.state.write().device_mut(index)?.alive = alive;
        Ok(())
    }

    /// Set the raw text of an attribute of device `index`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::DeviceNotFound` for an unknown device.
    pub fn set_attribute(
        &self,
        index: u8,
        attribute: DeviceAttribute,
        value: impl Into<String>,
    ) -> Result<()> {
        self.state
            .write()
            .device_mut(index)?
            .attributes
            .insert(attribute, value.into());
        Ok(())
    }

    /// Bind a performance-counter token to `file_name` of device `index`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::DeviceNotFound` for an unknown device or file.
    pub fn bind_counter(&self, index: u8, file_name: &str, token: impl Into<String>) -> Result<()> {
        let mut state = self.state.write();
        let device = state.device_mut(index)?;
        let path = device.file(file_name)?.path().to_path_buf();
        device
            .counters
            .insert(path, PerformanceCounterHandle::new(file_name, token));
        Ok(())
    }

    /// Replace the sensor readings of device `index`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::DeviceNotFound` for an unknown device.
    pub fn set_sensors(&self, index: u8, readings: Vec<SensorReading>) -> Result<()> {
        self.state.write().device_mut(index)?.sensors = Some(readings);
        Ok(())
    }

    /// Make enumeration fail as if the source could not be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.write().unreachable = unreachable;
    }
}

impl TopologySource for MemorySource {
    fn enumerate_devices(&self) -> Result<Vec<DeviceFacts>> {
        let state = self.state.read();
        if state.unreachable {
            return Err(DeviceError::device_not_found("memory source"));
        }
        Ok(state.devices.values().map(|d| d.facts).collect())
    }

    fn read_device_file_list(&self, device_index: u8) -> Result<Vec<DeviceFile>> {
        Ok(self.state.read().device(device_index)?.files.clone())
    }

    fn is_alive(&self, device_index: u8) -> Result<bool> {
        Ok(self.state.read().device(device_index)?.alive)
    }

    fn read_lock_holders(
        &self,
        device_index: u8,
        files: &[DeviceFile],
    ) -> Result<BTreeMap<PathBuf, OwnerId>> {
        let state = self.state.read();
        Ok(holders_of(state.device(device_index)?, files))
    }

    fn read_attribute(&self, device_index: u8, attribute: DeviceAttribute) -> Result<String> {
        self.state
            .read()
            .device(device_index)?
            .attributes
            .get(&attribute)
            .map(|v| v.trim().to_string())
            .ok_or_else(|| DeviceError::unsupported(attribute.name()))
    }

    fn read_performance_counter(
        &self,
        file: &DeviceFile,
    ) -> Result<Option<PerformanceCounterHandle>> {
        Ok(self
            .state
            .read()
            .device(file.device_index())?
            .counters
            .get(file.path())
            .cloned())
    }

    fn read_sensors(&self, device_index: u8) -> Result<Vec<SensorReading>> {
        self.state
            .read()
            .device(device_index)?
            .sensors
            .clone()
            .ok_or_else(|| DeviceError::unsupported("hwmon"))
    }

    fn read_lock_table(&self, device_index: u8, files: &[DeviceFile]) -> Result<LockTable> {
        let state = self.state.read();
        let device = state.device(device_index)?;
        Ok(LockTable::from_parts(device.alive, holders_of(device, files)))
    }
}

fn holders_of(device: &MemoryDevice, files: &[DeviceFile]) -> BTreeMap<PathBuf, OwnerId> {
    files
        .iter()
        .filter_map(|f| {
            device
                .holders
                .get(f.path())
                .map(|owner| (f.path().to_path_buf(), owner.clone()))
        })
        .collect()
}
