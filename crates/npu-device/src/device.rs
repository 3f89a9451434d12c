//! Device descriptor
//!
//! A [`Device`] is a snapshot of one physical NPU: identity and validated
//! core topology are fixed when it is built, while attributes, liveness and
//! occupancy are read from its source on every call. Each accessor fails on
//! its own; a missing NUMA node never hides the serial number.

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, LazyLock};

use npu_chip::Arch;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::counters::{ErrorStates, PerformanceCounters};
use crate::error::{DeviceError, Result};
use crate::hwmon::SensorReading;
use crate::occupancy::{CoreStatus, Occupancy, OwnerId};
use crate::source::{DeviceAttribute, DeviceFacts, TopologySource};
use crate::topology::{CoreIdx, CoreTopology, DeviceFile};

static CLOCK_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[\w ]+)\((?P<unit>[^)]*)\): (?P<value>\d+)$")
        .expect("built-in clock frequency pattern must compile")
});

/// One named clock of a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClockFrequency {
    /// Clock name (`ne tensor`)
    pub name: String,
    /// Unit as reported (`MHz`)
    pub unit: String,
    /// Frequency in `unit`
    pub value: u32,
}

impl ClockFrequency {
    /// Parse the driver's `<name>(<unit>): <value>` listing. Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::ParseError` for any other line that does not match.
    pub fn parse_list(contents: &str) -> Result<Vec<Self>> {
        contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|line| -> Result<Self> {
                let caps = CLOCK_LINE
                    .captures(line)
                    .ok_or_else(|| {
                        DeviceError::parse_error(line, "expected `<name>(<unit>): <value>`")
                    })?;
                let value = caps["value"]
                    .parse::<u32>()
                    .map_err(|e| DeviceError::parse_error(line, e.to_string()))?;
                Ok(Self {
                    name: caps["name"].trim().to_string(),
                    unit: caps["unit"].to_string(),
                    value,
                })
            })
            .collect()
    }
}

impl fmt::Display for ClockFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.name, self.value, self.unit)
    }
}

/// A physical NPU device
///
/// Cheap to clone; clones share the source.
#[derive(Debug, Clone)]
pub struct Device {
    facts: DeviceFacts,
    topology: CoreTopology,
    source: Arc<dyn TopologySource>,
}

impl Device {
    /// Read and validate the device file listing of `facts.index`.
    pub(crate) fn build(source: Arc<dyn TopologySource>, facts: DeviceFacts) -> Result<Self> {
        let files = source.read_device_file_list(facts.index)?;
        let topology = CoreTopology::build(facts.index, facts.arch, facts.core_num, files)?;

        Ok(Self {
            facts,
            topology,
            source,
        })
    }

    /// Device name (`npu0`).
    #[must_use]
    pub fn name(&self) -> String {
        format!("npu{}", self.facts.index)
    }

    /// Device index.
    #[must_use]
    pub const fn index(&self) -> u8 {
        self.facts.index
    }

    /// Architecture.
    #[must_use]
    pub const fn arch(&self) -> Arch {
        self.topology.arch()
    }

    /// Whether the device is alive right now.
    ///
    /// # Errors
    ///
    /// Returns an error if liveness cannot be read or is malformed.
    pub fn alive(&self) -> Result<bool> {
        self.source.is_alive(self.facts.index)
    }

    fn attribute(&self, attribute: DeviceAttribute) -> Result<String> {
        self.source.read_attribute(self.facts.index, attribute)
    }

    /// Board serial number.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Unsupported` if the platform does not report it,
    /// or an I/O error reading it.
    pub fn serial_number(&self) -> Result<String> {
        self.attribute(DeviceAttribute::SerialNumber)
    }

    /// Device UUID.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Unsupported` if the platform does not report it,
    /// or an I/O error reading it.
    pub fn uuid(&self) -> Result<String> {
        self.attribute(DeviceAttribute::Uuid)
    }

    /// Firmware version.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Unsupported` if the platform does not report it,
    /// or an I/O error reading it.
    pub fn firmware_version(&self) -> Result<String> {
        self.attribute(DeviceAttribute::FirmwareVersion)
    }

    /// Kernel driver version.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Unsupported` if the platform does not report it,
    /// or an I/O error reading it.
    pub fn driver_version(&self) -> Result<String> {
        self.attribute(DeviceAttribute::DriverVersion)
    }

    /// PCI bus address (`0000:6d:00.0`).
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Unsupported` if the platform does not report it,
    /// or an I/O error reading it.
    pub fn busname(&self) -> Result<String> {
        self.attribute(DeviceAttribute::PciBusName)
    }

    /// PCI device id as `major:minor`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Unsupported` if the platform does not report it,
    /// or an I/O error reading it.
    pub fn pci_dev(&self) -> Result<String> {
        self.attribute(DeviceAttribute::PciDeviceId)
    }

    /// Firmware heartbeat counter.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::UnexpectedValue` if the counter is not a `u32`.
    pub fn heartbeat(&self) -> Result<u32> {
        let raw = self.attribute(DeviceAttribute::Heartbeat)?;
        raw.parse().map_err(|_| {
            DeviceError::unexpected_value(format!(
                "{}: heartbeat {raw:?} is not a counter",
                self.name()
            ))
        })
    }

    /// NUMA node of the device's PCI lane.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Unsupported` when the platform has no NUMA
    /// (reported as `-1`), and `DeviceError::UnexpectedValue` for anything
    /// that is not a node id.
    pub fn numa_node(&self) -> Result<usize> {
        let raw = self.attribute(DeviceAttribute::NumaNode)?;
        let node = raw.parse::<i64>().map_err(|_| {
            DeviceError::unexpected_value(format!("{}: numa_node {raw:?}", self.name()))
        })?;

        match node {
            -1 => Err(DeviceError::unsupported("numa_node")),
            n => usize::try_from(n).map_err(|_| {
                DeviceError::unexpected_value(format!("{}: numa_node {n}", self.name()))
            }),
        }
    }

    /// Clock frequencies, in reported order.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::ParseError` if a line is malformed.
    pub fn clock_frequency(&self) -> Result<Vec<ClockFrequency>> {
        ClockFrequency::parse_list(&self.attribute(DeviceAttribute::ClockFrequency)?)
    }

    /// Dense core count.
    #[must_use]
    pub fn core_num(&self) -> u8 {
        self.topology.core_num()
    }

    /// Core indices, `0..core_num`.
    #[must_use]
    pub fn core_ids(&self) -> &[CoreIdx] {
        self.topology.core_ids()
    }

    /// Validated device files, ordered by core range.
    #[must_use]
    pub fn dev_files(&self) -> &[DeviceFile] {
        self.topology.dev_files()
    }

    /// The validated core topology.
    #[must_use]
    pub const fn topology(&self) -> &CoreTopology {
        &self.topology
    }

    /// Per-core statuses from one read of liveness and lock state.
    ///
    /// # Errors
    ///
    /// Returns an error if liveness or lock state cannot be read.
    pub fn occupancy(&self) -> Result<Occupancy> {
        let table = self
            .source
            .read_lock_table(self.facts.index, self.topology.dev_files())?;
        Ok(Occupancy::resolve(&self.topology, &table))
    }

    fn check_core(&self, core: CoreIdx) -> Result<()> {
        if self.topology.has_core(core) {
            Ok(())
        } else {
            Err(DeviceError::invalid_input(format!(
                "{} has no core {core} ({} cores)",
                self.name(),
                self.core_num()
            )))
        }
    }

    /// Status of a single core.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::InvalidInput` for a core the device does not have,
    /// or an error reading liveness or lock state.
    pub fn core_status(&self, core: CoreIdx) -> Result<CoreStatus> {
        self.check_core(core)?;
        self.occupancy()?.status(core)
    }

    /// Holder of an occupied core.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Unavailable` if the core is not occupied, and
    /// `DeviceError::InvalidInput` for a core the device does not have.
    pub fn core_occupied_owner(&self, core: CoreIdx) -> Result<OwnerId> {
        self.check_core(core)?;
        self.occupancy()?.owner(core).cloned()
    }

    /// Status of every core, ascending by core index, from a single snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if liveness or lock state cannot be read.
    pub fn all_core_status(&self) -> Result<Vec<(CoreIdx, CoreStatus)>> {
        Ok(self.occupancy()?.statuses())
    }

    /// Error-state counters in reported order.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::ParseError` or `DeviceError::UnexpectedValue` if
    /// the listing is malformed or repeats a key.
    pub fn error_states(&self) -> Result<ErrorStates> {
        ErrorStates::parse(&self.attribute(DeviceAttribute::ErrorStates)?)
    }

    /// Device files with an active performance-counter binding.
    ///
    /// # Errors
    ///
    /// Returns an error if a binding state cannot be read.
    pub fn performance_counters(&self) -> Result<PerformanceCounters> {
        let mut counters = Vec::new();
        for file in self.topology.dev_files() {
            if let Some(handle) = self.source.read_performance_counter(file)? {
                counters.push((file.clone(), handle));
            }
        }
        Ok(counters)
    }

    /// hwmon sensor readings.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Unsupported` if the device exposes no sensors.
    pub fn sensors(&self) -> Result<Vec<SensorReading>> {
        self.source.read_sensors(self.facts.index)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "npu{}", self.facts.index)
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.facts.index == other.facts.index
    }
}

impl Eq for Device {}

impl PartialOrd for Device {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Device {
    fn cmp(&self, other: &Self) -> Ordering {
        self.facts.index.cmp(&other.facts.index)
    }
}
