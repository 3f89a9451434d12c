//! Error-state counters and performance-counter bindings
//!
//! The driver reports address-translation errors as text:
//!
//! ```text
//! AXI Post Error: 0
//! PCIe Fetch Error: 3
//! Device Error: 0
//! ```
//!
//! which [`ErrorStates::parse`] turns into `axi_post_error → 0`,
//! `pcie_fetch_error → 3`, `device_error → 0` in discovery order.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{DeviceError, Result};
use crate::topology::DeviceFile;

/// Named error counters of one device, in discovery order, keys unique.
///
/// A missing key means zero or unknown, never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorStates {
    entries: Vec<(String, u32)>,
}

impl ErrorStates {
    /// Parse the driver's `Label: count` listing.
    ///
    /// Labels are normalized to lower snake case. Blank lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::ParseError` for a line without a `u32` count and
    /// `DeviceError::UnexpectedValue` if two lines normalize to the same key.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut states = Self::default();

        for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (label, value) = line
                .rsplit_once(':')
                .ok_or_else(|| DeviceError::parse_error(line, "expected `<label>: <count>`"))?;

            let count = value
                .trim()
                .parse::<u32>()
                .map_err(|e| DeviceError::parse_error(line, e.to_string()))?;

            let key = label
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("_")
                .to_lowercase();

            states.insert(key, count)?;
        }

        Ok(states)
    }

    /// Append a counter.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::UnexpectedValue` if the key is already present.
    pub fn insert(&mut self, key: impl Into<String>, count: u32) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(DeviceError::unexpected_value("empty error state key"));
        }
        if self.get(&key).is_some() {
            return Err(DeviceError::unexpected_value(format!("error state {key} reported twice")));
        }
        self.entries.push((key, count));
        Ok(())
    }

    /// Count for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }

    /// Counters in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Keys in discovery order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Number of counters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no counter was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all counts, saturating.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.entries
            .iter()
            .fold(0u32, |acc, (_, v)| acc.saturating_add(*v))
    }
}

impl Serialize for ErrorStates {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ErrorStates {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct StatesVisitor;

        impl<'de> Visitor<'de> for StatesVisitor {
            type Value = ErrorStates;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of error state names to u32 counts")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut states = ErrorStates::default();
                while let Some((key, count)) = access.next_entry::<String, u32>()? {
                    states.insert(key, count).map_err(serde::de::Error::custom)?;
                }
                Ok(states)
            }
        }

        deserializer.deserialize_map(StatesVisitor)
    }
}

/// Opaque token binding a device file to an external performance monitor.
///
/// This crate only pairs the token with its device file; counter values
/// are interpreted by whoever holds the token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerformanceCounterHandle {
    device_file: String,
    token: String,
}

impl PerformanceCounterHandle {
    /// Bind `token` to the device file named `device_file`.
    pub fn new(device_file: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            device_file: device_file.into(),
            token: token.into(),
        }
    }

    /// Name of the bound device file.
    #[must_use]
    pub fn device_file(&self) -> &str {
        &self.device_file
    }

    /// The opaque token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Device files with an active counter binding, paired with their handle.
pub type PerformanceCounters = Vec<(DeviceFile, PerformanceCounterHandle)>;
