//! Device registry
//!
//! Entry point for every query. A registry owns nothing but its source;
//! each call enumerates and validates from scratch, so the devices it hands
//! out are independent snapshots.

use std::sync::Arc;

use tracing::{debug, info};

use crate::device::Device;
use crate::error::{DeviceError, Result};
use crate::naming;
use crate::source::TopologySource;
use crate::sources::SysfsSource;
use crate::topology::DeviceFile;

/// Registry of NPU devices visible through one topology source.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    source: Arc<dyn TopologySource>,
}

impl DeviceRegistry {
    /// Registry over `source`.
    pub fn new(source: impl TopologySource + 'static) -> Self {
        Self::from_source(Arc::new(source))
    }

    /// Registry over an already shared source.
    #[must_use]
    pub fn from_source(source: Arc<dyn TopologySource>) -> Self {
        Self { source }
    }

    /// Registry over the live system, with roots taken from the environment.
    #[must_use]
    pub fn system() -> Self {
        Self::new(SysfsSource::from_env())
    }

    /// The underlying source.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn TopologySource> {
        &self.source
    }

    /// All devices, ascending by index.
    ///
    /// No devices is an empty list, not an error. A device whose topology
    /// fails validation fails the whole call.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::DeviceNotFound` if the source cannot be reached,
    /// or the first error building any device.
    pub fn list_devices(&self) -> Result<Vec<Device>> {
        let mut facts = self.source.enumerate_devices()?;
        facts.sort_by_key(|f| f.index);

        let devices = facts
            .into_iter()
            .map(|f| Device::build(Arc::clone(&self.source), f))
            .collect::<Result<Vec<_>>>()?;

        info!("Listed {} device(s)", devices.len());
        Ok(devices)
    }

    /// Device with index `index`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::DeviceNotFound` if no device has that index.
    pub fn get_device(&self, index: u8) -> Result<Device> {
        let facts = self
            .source
            .enumerate_devices()?
            .into_iter()
            .find(|f| f.index == index)
            .ok_or_else(|| DeviceError::device_not_found(format!("npu{index}")))?;

        debug!("Building npu{index} ({})", facts.arch);
        Device::build(Arc::clone(&self.source), facts)
    }

    /// Device file named `name` (`npu0pe1-2`).
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::InvalidInput` if `name` is not a device file
    /// name, and `DeviceError::DeviceNotFound` if the device or the file
    /// does not exist.
    pub fn get_device_file_by_name(&self, name: &str) -> Result<DeviceFile> {
        let parsed = naming::parse_name(name)?;
        let device = self.get_device(parsed.device_index)?;

        device
            .topology()
            .file_by_name(name)
            .cloned()
            .ok_or_else(|| DeviceError::device_not_found(name))
    }
}
