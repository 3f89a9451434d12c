//! Core occupancy resolution
//!
//! Occupancy is never stored. Every query reads one [`LockTable`] from the
//! topology source (liveness plus the holder of each locked device file) and
//! reduces it to per-core statuses:
//!
//! ```text
//! device not alive                              → Unavailable
//! some file covering the core is lock-held      → Occupied(holder)
//! otherwise                                     → Available
//! ```
//!
//! Two overlapping files held at once (a fusion file and a single-core file
//! inside it) should not happen under correct external locking. When it
//! does, the holder of the lexicographically lowest file path wins.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DeviceError, Result};
use crate::topology::{CoreIdx, CoreTopology};

/// Identifier of the process-held descriptor that locks a device file.
///
/// A lookup key for display and diagnostics only. Nothing in this crate
/// opens, dereferences or closes what it refers to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Wrap a raw owner identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Owner of a descriptor held by process `pid`.
    #[must_use]
    pub fn pid(pid: u32) -> Self {
        Self(format!("pid:{pid}"))
    }

    /// Raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Status of one core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoreStatus {
    /// Free and healthy
    Available,
    /// Locked by a live process through some device file
    Occupied,
    /// Exists in the topology but cannot be used right now
    Unavailable,
}

impl fmt::Display for CoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Occupied => write!(f, "occupied"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

impl FromStr for CoreStatus {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(Self::Available),
            "occupied" => Ok(Self::Occupied),
            "unavailable" => Ok(Self::Unavailable),
            _ => Err(DeviceError::parse_error(
                s,
                "expected available, occupied or unavailable",
            )),
        }
    }
}

/// One consistent read of a device's liveness and file locks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockTable {
    alive: bool,
    holders: BTreeMap<PathBuf, OwnerId>,
}

impl LockTable {
    /// Table with no held files.
    #[must_use]
    pub fn new(alive: bool) -> Self {
        Self {
            alive,
            holders: BTreeMap::new(),
        }
    }

    /// Table from liveness and per-path holders.
    #[must_use]
    pub fn from_parts(alive: bool, holders: BTreeMap<PathBuf, OwnerId>) -> Self {
        Self { alive, holders }
    }

    /// Record `owner` as holding the file at `path`.
    #[must_use]
    pub fn with_holder(mut self, path: impl Into<PathBuf>, owner: OwnerId) -> Self {
        self.holders.insert(path.into(), owner);
        self
    }

    /// Whether the device was alive at read time.
    #[must_use]
    pub const fn alive(&self) -> bool {
        self.alive
    }

    /// Holder of the file at `path`, if it is locked.
    #[must_use]
    pub fn holder(&self, path: &Path) -> Option<&OwnerId> {
        self.holders.get(path)
    }

    /// Locked files in path order.
    pub fn holders(&self) -> impl Iterator<Item = (&Path, &OwnerId)> {
        self.holders.iter().map(|(p, o)| (p.as_path(), o))
    }
}

/// Resolved state of one core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoreOccupancy {
    /// Core index
    pub core: CoreIdx,
    /// Derived status
    pub status: CoreStatus,
    /// Holder, present exactly when `status` is `Occupied`
    pub owner: Option<OwnerId>,
    /// Device file through which the core is held
    pub held_via: Option<PathBuf>,
}

/// Per-core statuses of one device, all derived from the same [`LockTable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    device_index: u8,
    cores: Vec<CoreOccupancy>,
}

impl Occupancy {
    /// Reduce a lock table to per-core statuses.
    #[must_use]
    pub fn resolve(topology: &CoreTopology, table: &LockTable) -> Self {
        let cores = topology
            .core_ids()
            .iter()
            .map(|&core| resolve_core(topology, table, core))
            .collect();

        Self {
            device_index: topology.device_index(),
            cores,
        }
    }

    /// Owning device index.
    #[must_use]
    pub const fn device_index(&self) -> u8 {
        self.device_index
    }

    /// Full state of `core`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::InvalidInput` if the device has no such core.
    pub fn core(&self, core: CoreIdx) -> Result<&CoreOccupancy> {
        self.cores.get(usize::from(core)).ok_or_else(|| {
            DeviceError::invalid_input(format!(
                "npu{} has no core {core} ({} cores)",
                self.device_index,
                self.cores.len()
            ))
        })
    }

    /// Status of `core`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::InvalidInput` if the device has no such core.
    pub fn status(&self, core: CoreIdx) -> Result<CoreStatus> {
        self.core(core).map(|c| c.status)
    }

    /// Holder of `core`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Unavailable` if the core is not occupied, and
    /// `DeviceError::InvalidInput` if the device has no such core.
    pub fn owner(&self, core: CoreIdx) -> Result<&OwnerId> {
        let state = self.core(core)?;
        state.owner.as_ref().ok_or_else(|| {
            DeviceError::unavailable(format!(
                "core {core} of npu{} is {}, not occupied",
                self.device_index,
                state.status
            ))
        })
    }

    /// `(core, status)` pairs, ascending by core.
    #[must_use]
    pub fn statuses(&self) -> Vec<(CoreIdx, CoreStatus)> {
        self.cores.iter().map(|c| (c.core, c.status)).collect()
    }

    /// Per-core states, ascending by core.
    pub fn iter(&self) -> impl Iterator<Item = &CoreOccupancy> {
        self.cores.iter()
    }
}

fn resolve_core(topology: &CoreTopology, table: &LockTable, core: CoreIdx) -> CoreOccupancy {
    if !table.alive() {
        return CoreOccupancy {
            core,
            status: CoreStatus::Unavailable,
            owner: None,
            held_via: None,
        };
    }

    let held = topology
        .files_covering(core)
        .filter_map(|f| table.holder(f.path()).map(|owner| (f.path(), owner)))
        .min_by(|a, b| a.0.cmp(b.0));

    match held {
        Some((path, owner)) => CoreOccupancy {
            core,
            status: CoreStatus::Occupied,
            owner: Some(owner.clone()),
            held_via: Some(path.to_path_buf()),
        },
        None => CoreOccupancy {
            core,
            status: CoreStatus::Available,
            owner: None,
            held_via: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::DeviceFile;
    use npu_chip::Arch;

    fn topology() -> CoreTopology {
        let files = ["npu0", "npu0pe0", "npu0pe1", "npu0pe1-2", "npu0pe2"]
            .iter()
            .map(|n| DeviceFile::from_name("/dev", n).unwrap())
            .collect();
        CoreTopology::build(0, Arch::Rngd, 4, files).unwrap()
    }

    #[test]
    fn test_all_available() {
        let occ = Occupancy::resolve(&topology(), &LockTable::new(true));
        assert!(occ.iter().all(|c| c.status == CoreStatus::Available));
        assert!(matches!(occ.owner(0), Err(DeviceError::Unavailable { .. })));
    }

    #[test]
    fn test_fusion_lock_occupies_range() {
        let table = LockTable::new(true).with_holder("/dev/npu0pe1-2", OwnerId::pid(1234));
        let occ = Occupancy::resolve(&topology(), &table);

        assert_eq!(
            occ.statuses(),
            vec![
                (0, CoreStatus::Available),
                (1, CoreStatus::Occupied),
                (2, CoreStatus::Occupied),
                (3, CoreStatus::Available),
            ]
        );
        assert_eq!(occ.owner(1).unwrap().as_str(), "pid:1234");
        assert_eq!(
            occ.core(2).unwrap().held_via.as_deref(),
            Some(Path::new("/dev/npu0pe1-2"))
        );
    }

    #[test]
    fn test_multicore_lock_occupies_everything() {
        let table = LockTable::new(true).with_holder("/dev/npu0", OwnerId::pid(7));
        let occ = Occupancy::resolve(&topology(), &table);
        assert!(occ.iter().all(|c| c.status == CoreStatus::Occupied));
    }

    #[test]
    fn test_overlapping_holders_pick_lowest_path() {
        let table = LockTable::new(true)
            .with_holder("/dev/npu0pe1-2", OwnerId::pid(20))
            .with_holder("/dev/npu0pe1", OwnerId::pid(10))
            .with_holder("/dev/npu0pe2", OwnerId::pid(30));
        let occ = Occupancy::resolve(&topology(), &table);

        // "npu0pe1" < "npu0pe1-2" < "npu0pe2"
        assert_eq!(occ.owner(1).unwrap(), &OwnerId::pid(10));
        assert_eq!(occ.owner(2).unwrap(), &OwnerId::pid(20));
    }

    #[test]
    fn test_dead_device_is_unavailable() {
        let table = LockTable::new(false).with_holder("/dev/npu0", OwnerId::pid(7));
        let occ = Occupancy::resolve(&topology(), &table);
        assert!(occ.iter().all(|c| c.status == CoreStatus::Unavailable));
        assert!(matches!(occ.owner(0), Err(DeviceError::Unavailable { .. })));
    }

    #[test]
    fn test_unknown_core() {
        let occ = Occupancy::resolve(&topology(), &LockTable::new(true));
        assert!(matches!(occ.status(4), Err(DeviceError::InvalidInput { .. })));
    }

    #[test]
    fn test_core_status_text() {
        assert_eq!(CoreStatus::Available.to_string(), "available");
        assert_eq!("Available".parse::<CoreStatus>().unwrap(), CoreStatus::Available);
        assert_eq!("OCCUPIED".parse::<CoreStatus>().unwrap(), CoreStatus::Occupied);
        assert!("busy".parse::<CoreStatus>().is_err());
    }
}
