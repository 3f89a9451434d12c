//! Device topology and core occupancy model for FuriosaAI NPUs.
//!
//! Answers three questions about the NPUs on a host: which devices exist,
//! how each device's cores are exposed through device files, and which of
//! those cores are currently held by a process. All answers are read-only
//! snapshots of OS state at call time.
//!
//! # Layers
//!
//! ```text
//! DeviceRegistry   list_devices / get_device / get_device_file_by_name
//!   Device         attributes, topology, occupancy, counters, sensors
//!     CoreTopology validated device files, dense core ids
//!     Occupancy    per-core Available / Occupied / Unavailable
//! TopologySource   SysfsSource (devfs + sysfs + procfs) | MemorySource
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use npu_device::DeviceRegistry;
//!
//! # fn main() -> npu_device::Result<()> {
//! let registry = DeviceRegistry::system();
//! for device in registry.list_devices()? {
//!     println!("{device} ({}): {} cores", device.arch(), device.core_num());
//!     for (core, status) in device.all_core_status()? {
//!         println!("  pe{core}: {status}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Roots default to `/dev`, `/sys` and `/proc` and can be redirected with
//! `NPU_DEVFS`, `NPU_SYSFS` and `NPU_PROCFS`.

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
mod counters;
mod device;
mod error;
mod hwmon;
pub mod naming;
mod occupancy;
pub mod proc;
mod registry;
mod source;
pub mod sources;
mod topology;

pub use config::SourceConfig;
pub use counters::{ErrorStates, PerformanceCounterHandle, PerformanceCounters};
pub use device::{ClockFrequency, Device};
pub use error::{DeviceError, Result};
pub use hwmon::{read_sensors, SensorKind, SensorReading};
pub use npu_chip::Arch;
pub use occupancy::{CoreOccupancy, CoreStatus, LockTable, Occupancy, OwnerId};
pub use registry::DeviceRegistry;
pub use source::{DeviceAttribute, DeviceFacts, TopologySource};
pub use topology::{CoreIdx, CoreRange, CoreTopology, DeviceFile, DeviceMode};

/// List every device on the live system.
///
/// # Errors
///
/// See [`DeviceRegistry::list_devices`].
pub fn list_devices() -> Result<Vec<Device>> {
    DeviceRegistry::system().list_devices()
}

/// Device `index` on the live system.
///
/// # Errors
///
/// See [`DeviceRegistry::get_device`].
pub fn get_device(index: u8) -> Result<Device> {
    DeviceRegistry::system().get_device(index)
}

/// Device file `name` on the live system.
///
/// # Errors
///
/// See [`DeviceRegistry::get_device_file_by_name`].
pub fn get_device_file(name: &str) -> Result<DeviceFile> {
    DeviceRegistry::system().get_device_file_by_name(name)
}

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        Arch, CoreRange, CoreStatus, Device, DeviceError, DeviceFile, DeviceMode,
        DeviceRegistry, ErrorStates, OwnerId, Result, TopologySource,
    };
}
