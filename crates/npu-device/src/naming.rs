//! Device file naming grammar
//!
//! ```text
//! npu<index>                MultiCore, all cores
//! npu<index>pe<core>        Single core
//! npu<index>pe<start>-<end> Fusion, inclusive, start < end
//! ```

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{DeviceError, Result};
use crate::topology::{CoreIdx, CoreRange, DeviceMode};

static DEVICE_FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^npu(?P<device>\d+)(?:pe(?P<start>\d+)(?:-(?P<end>\d+))?)?$")
        .expect("built-in device file pattern must compile")
});

/// A device file name decoded into its `(device_index, core_range, mode)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceFileName {
    /// Owning device index
    pub device_index: u8,
    /// Cores the file covers
    pub core_range: CoreRange,
    /// Operating mode implied by the name
    pub mode: DeviceMode,
}

impl DeviceFileName {
    /// Render the canonical name (`npu0pe1-2`).
    #[must_use]
    pub fn render(&self) -> String {
        match self.core_range {
            CoreRange::All => format!("npu{}", self.device_index),
            CoreRange::Range(s, e) if s == e => format!("npu{}pe{s}", self.device_index),
            CoreRange::Range(s, e) => format!("npu{}pe{s}-{e}", self.device_index),
        }
    }
}

/// Decode a device file name.
///
/// # Errors
///
/// Returns `DeviceError::InvalidInput` if `name` does not follow the grammar,
/// an index does not fit in `u8`, or a fusion range is not strictly increasing.
pub fn parse_name(name: &str) -> Result<DeviceFileName> {
    let caps = DEVICE_FILE_NAME
        .captures(name)
        .ok_or_else(|| DeviceError::invalid_input(format!("{name} is not a device file name")))?;

    let device_index = parse_index(name, &caps, "device")?
        .ok_or_else(|| DeviceError::invalid_input(format!("{name} has no device index")))?;
    let start = parse_index(name, &caps, "start")?;
    let end = parse_index(name, &caps, "end")?;

    let (core_range, mode) = match (start, end) {
        (None, _) => (CoreRange::All, DeviceMode::MultiCore),
        (Some(core), None) => (CoreRange::single(core), DeviceMode::Single),
        (Some(start), Some(end)) if start < end => {
            (CoreRange::Range(start, end), DeviceMode::Fusion)
        }
        (Some(start), Some(end)) => {
            return Err(DeviceError::invalid_input(format!(
                "{name}: fusion range {start}-{end} must be increasing"
            )))
        }
    };

    Ok(DeviceFileName {
        device_index,
        core_range,
        mode,
    })
}

fn parse_index(name: &str, caps: &Captures<'_>, group: &str) -> Result<Option<CoreIdx>> {
    caps.name(group)
        .map(|m| {
            m.as_str().parse::<u8>().map_err(|e| {
                DeviceError::invalid_input(format!("{name}: {group} index {}: {e}", m.as_str()))
            })
        })
        .transpose()
}
