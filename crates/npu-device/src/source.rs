//! Topology source abstraction
//!
//! Everything this crate knows about devices comes through a
//! [`TopologySource`]: which devices exist, which device files each exposes,
//! whether a device is alive, who holds which file, and raw attribute text.
//! Sources are read-only. Each call reflects the OS state at call time and
//! nothing is cached between calls.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::path::PathBuf;

use npu_chip::{mgmt, Arch};

use crate::counters::PerformanceCounterHandle;
use crate::error::{DeviceError, Result};
use crate::hwmon::SensorReading;
use crate::occupancy::{LockTable, OwnerId};
use crate::topology::{CoreIdx, DeviceFile};

/// Static identity of one physical device as reported by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceFacts {
    /// Device index, unique among listed devices
    pub index: u8,
    /// Reported architecture
    pub arch: Arch,
    /// Dense core count
    pub core_num: u8,
}

/// Per-device attribute readable as raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceAttribute {
    /// Board serial number
    SerialNumber,
    /// Device UUID
    Uuid,
    /// Firmware revision
    FirmwareVersion,
    /// Kernel driver version
    DriverVersion,
    /// PCI bus address
    PciBusName,
    /// PCI `major:minor`
    PciDeviceId,
    /// Firmware heartbeat counter
    Heartbeat,
    /// Clock frequency listing
    ClockFrequency,
    /// Error-state listing
    ErrorStates,
    /// NUMA node of the PCI lane
    NumaNode,
}

impl DeviceAttribute {
    /// Every attribute, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::SerialNumber,
        Self::Uuid,
        Self::FirmwareVersion,
        Self::DriverVersion,
        Self::PciBusName,
        Self::PciDeviceId,
        Self::Heartbeat,
        Self::ClockFrequency,
        Self::ErrorStates,
        Self::NumaNode,
    ];

    /// Attribute name as the driver spells it.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SerialNumber => mgmt::DEVICE_SN,
            Self::Uuid => mgmt::DEVICE_UUID,
            Self::FirmwareVersion => mgmt::FW_VERSION,
            Self::DriverVersion => mgmt::VERSION,
            Self::PciBusName => mgmt::BUSNAME,
            Self::PciDeviceId => mgmt::DEV,
            Self::Heartbeat => mgmt::HEARTBEAT,
            Self::ClockFrequency => mgmt::NE_CLK_FREQ_INFO,
            Self::ErrorStates => mgmt::ATR_ERROR,
            Self::NumaNode => "numa_node",
        }
    }
}

impl fmt::Display for DeviceAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Provider of raw device, core and lock facts
///
/// Implementations must be safe to call from several threads at once and
/// must not keep a cursor or buffer shared between calls.
pub trait TopologySource: Debug + Send + Sync {
    /// List physical devices, ascending by index.
    ///
    /// An empty list is a valid answer.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::DeviceNotFound` if the source itself cannot be
    /// reached, or an I/O error reading it.
    fn enumerate_devices(&self) -> Result<Vec<DeviceFacts>>;

    /// List the device files registered for a device, unvalidated.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::DeviceNotFound` for an unknown device index.
    fn read_device_file_list(&self, device_index: u8) -> Result<Vec<DeviceFile>>;

    /// Whether the device is alive.
    ///
    /// # Errors
    ///
    /// Returns an error if liveness cannot be read or is not `0`/`1`.
    fn is_alive(&self, device_index: u8) -> Result<bool>;

    /// Holders of those `files` currently locked by a live process.
    ///
    /// Files that are not locked are absent from the map.
    ///
    /// # Errors
    ///
    /// Returns an error if lock state cannot be read.
    fn read_lock_holders(
        &self,
        device_index: u8,
        files: &[DeviceFile],
    ) -> Result<BTreeMap<PathBuf, OwnerId>>;

    /// Raw text of an attribute, trimmed.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Unsupported` if the platform does not expose
    /// the attribute at all.
    fn read_attribute(&self, device_index: u8, attribute: DeviceAttribute) -> Result<String>;

    /// Counter binding of a device file, `None` when no binding is active.
    ///
    /// # Errors
    ///
    /// Returns an error if the binding state cannot be read.
    fn read_performance_counter(
        &self,
        _file: &DeviceFile,
    ) -> Result<Option<PerformanceCounterHandle>> {
        Ok(None)
    }

    /// hwmon sensor readings of a device.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Unsupported` unless the source exposes sensors.
    fn read_sensors(&self, _device_index: u8) -> Result<Vec<SensorReading>> {
        Err(DeviceError::unsupported("hwmon"))
    }

    /// Liveness and lock holders of a device in one read.
    ///
    /// Sources with a cheaper consistent read should override this.
    ///
    /// # Errors
    ///
    /// Returns an error if liveness or lock state cannot be read.
    fn read_lock_table(&self, device_index: u8, files: &[DeviceFile]) -> Result<LockTable> {
        let alive = self.is_alive(device_index)?;
        let holders = self.read_lock_holders(device_index, files)?;
        Ok(LockTable::from_parts(alive, holders))
    }

    /// Holder of a single core, if any device file covering it is locked.
    ///
    /// Overlapping holders resolve to the lowest file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file list or lock state cannot be read.
    fn read_core_lock(&self, device_index: u8, core: CoreIdx) -> Result<Option<OwnerId>> {
        let covering: Vec<DeviceFile> = self
            .read_device_file_list(device_index)?
            .into_iter()
            .filter(|f| f.core_range().contains(core))
            .collect();

        let holders = self.read_lock_holders(device_index, &covering)?;
        Ok(holders
            .into_iter()
            .find(|(path, _)| covering.iter().any(|f| f.path() == path))
            .map(|(_, owner)| owner))
    }
}
