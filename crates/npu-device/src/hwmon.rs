//! Hardware monitoring sensors (Linux hwmon)
//!
//! Files follow the kernel naming scheme `<type><number>_<item>`; this module
//! reads the `_input` value and the optional `_label` of every current,
//! voltage, power and temperature channel. Values are reported in hwmon's
//! native units (mA, mV, µW, m°C).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DeviceError, Result};

/// Sensor channel type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// `curr*`, milliamperes
    Current,
    /// `in*`, millivolts
    Voltage,
    /// `power*`, microwatts
    Power,
    /// `temp*`, millidegrees Celsius
    Temperature,
}

impl SensorKind {
    /// hwmon file prefix.
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Current => "curr",
            Self::Voltage => "in",
            Self::Power => "power",
            Self::Temperature => "temp",
        }
    }

    /// Unit of `_input` values.
    #[must_use]
    pub const fn unit(&self) -> &'static str {
        match self {
            Self::Current => "mA",
            Self::Voltage => "mV",
            Self::Power => "uW",
            Self::Temperature => "mC",
        }
    }
}

impl FromStr for SensorKind {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "curr" => Ok(Self::Current),
            "in" => Ok(Self::Voltage),
            "power" => Ok(Self::Power),
            "temp" => Ok(Self::Temperature),
            _ => Err(DeviceError::parse_error(s, "unsupported hwmon sensor type")),
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One sensor channel reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Channel type
    pub kind: SensorKind,
    /// Channel number from the file name
    pub channel: u8,
    /// `_label` contents, or `<type><channel>` when unlabeled
    pub label: String,
    /// `_input` value in native units
    pub value: i64,
}

/// Split `temp1_input` into `(Temperature, 1)`.
///
/// Returns `None` for files that are not `_input` channels of a known type.
pub(crate) fn parse_input_name(file_name: &str) -> Option<(SensorKind, u8)> {
    let stem = file_name.strip_suffix("_input")?;
    let digits_at = stem.find(|c: char| c.is_ascii_digit())?;
    let (prefix, number) = stem.split_at(digits_at);
    let kind = prefix.parse().ok()?;
    let channel = number.parse().ok()?;
    Some((kind, channel))
}

/// First `hwmon*` directory under a PCI device's `hwmon/`.
///
/// # Errors
///
/// Returns `DeviceError::Unsupported` if the device exposes no hwmon directory.
pub(crate) fn find_hwmon_dir(pci_dir: &Path) -> Result<PathBuf> {
    let hwmon_root = pci_dir.join("hwmon");
    let entries = match std::fs::read_dir(&hwmon_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DeviceError::unsupported("hwmon"))
        }
        Err(e) => return Err(e.into()),
    };

    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("hwmon"))
        })
        .collect();
    dirs.sort();

    dirs.into_iter()
        .next()
        .ok_or_else(|| DeviceError::unsupported("hwmon"))
}

/// Read every sensor channel in an hwmon directory, sorted by type then channel.
///
/// # Errors
///
/// Returns an I/O error if the directory or an `_input` file cannot be read,
/// and `DeviceError::UnexpectedValue` if an `_input` value is not an integer.
pub fn read_sensors(hwmon_dir: &Path) -> Result<Vec<SensorReading>> {
    let mut readings = Vec::new();

    for entry in std::fs::read_dir(hwmon_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some((kind, channel)) = name.to_str().and_then(parse_input_name) else {
            continue;
        };

        let raw = std::fs::read_to_string(entry.path())?;
        let value = raw.trim().parse::<i64>().map_err(|_| {
            DeviceError::unexpected_value(format!(
                "{}: bad sensor value {raw:?}",
                entry.path().display()
            ))
        })?;

        let label_path = hwmon_dir.join(format!("{}{channel}_label", kind.prefix()));
        let label = std::fs::read_to_string(&label_path)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| format!("{}{channel}", kind.prefix()));

        tracing::debug!("hwmon {}: {label} = {value} {}", hwmon_dir.display(), kind.unit());

        readings.push(SensorReading {
            kind,
            channel,
            label,
            value,
        });
    }

    readings.sort_by_key(|r| (r.kind, r.channel));
    Ok(readings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input_name() {
        assert_eq!(parse_input_name("temp1_input"), Some((SensorKind::Temperature, 1)));
        assert_eq!(parse_input_name("in0_input"), Some((SensorKind::Voltage, 0)));
        assert_eq!(parse_input_name("power12_input"), Some((SensorKind::Power, 12)));
        assert_eq!(parse_input_name("curr2_input"), Some((SensorKind::Current, 2)));
        assert_eq!(parse_input_name("temp1_label"), None);
        assert_eq!(parse_input_name("fan1_input"), None);
        assert_eq!(parse_input_name("name"), None);
    }

    #[test]
    fn test_read_sensors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("temp1_input"), "45000\n").unwrap();
        std::fs::write(dir.path().join("temp1_label"), "Peak\n").unwrap();
        std::fs::write(dir.path().join("power1_input"), "30000000\n").unwrap();
        std::fs::write(dir.path().join("name"), "npu\n").unwrap();

        let readings = read_sensors(dir.path()).unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].kind, SensorKind::Power);
        assert_eq!(readings[0].label, "power1");
        assert_eq!(readings[1].label, "Peak");
        assert_eq!(readings[1].value, 45_000);
    }

    #[test]
    fn test_missing_hwmon_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_hwmon_dir(dir.path()).unwrap_err().is_unsupported());
    }
}
