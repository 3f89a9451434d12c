//! Core topology: cores, core ranges and the device files that expose them
//!
//! A device with `core_num` cores has the dense core set `[0, core_num)`.
//! The kernel driver does not expose cores individually but through device
//! files, each covering a [`CoreRange`] under a [`DeviceMode`]. Ranges of
//! different files overlap by construction (a fusion file subsumes the
//! single-core files inside it, the multi-core file covers everything).
//!
//! [`CoreTopology::build`] validates a raw file listing against those rules
//! and fails the whole listing on the first inconsistent entry.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use npu_chip::Arch;
use serde::{Deserialize, Serialize};

use crate::error::{DeviceError, Result};
use crate::naming;

/// Core index within one device.
pub type CoreIdx = u8;

/// Cores covered by a device file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreRange {
    /// Every core of the device
    All,
    /// Inclusive `start..=end`
    Range(CoreIdx, CoreIdx),
}

impl CoreRange {
    /// Range covering exactly one core.
    #[must_use]
    pub const fn single(core: CoreIdx) -> Self {
        Self::Range(core, core)
    }

    /// Whether `core` is inside the range.
    #[must_use]
    pub fn contains(&self, core: CoreIdx) -> bool {
        match self {
            Self::All => true,
            Self::Range(s, e) => (*s..=*e).contains(&core),
        }
    }

    /// Inclusive bounds on a device with `core_num` cores.
    ///
    /// Returns `None` for `All` on a device without cores.
    #[must_use]
    pub fn bounds(&self, core_num: u8) -> Option<(CoreIdx, CoreIdx)> {
        match self {
            Self::All => core_num.checked_sub(1).map(|last| (0, last)),
            Self::Range(s, e) => Some((*s, *e)),
        }
    }

    /// Number of cores in the range on a device with `core_num` cores.
    #[must_use]
    pub fn len(&self, core_num: u8) -> usize {
        self.bounds(core_num)
            .map_or(0, |(s, e)| usize::from(e.saturating_sub(s)) + 1)
    }
}

impl Ord for CoreRange {
    /// `All` first, then narrower spans before wider ones, then by start.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::All, Self::All) => Ordering::Equal,
            (Self::All, Self::Range(..)) => Ordering::Less,
            (Self::Range(..), Self::All) => Ordering::Greater,
            (Self::Range(s1, e1), Self::Range(s2, e2)) => e1
                .saturating_sub(*s1)
                .cmp(&e2.saturating_sub(*s2))
                .then((s1, e1).cmp(&(s2, e2))),
        }
    }
}

impl PartialOrd for CoreRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CoreRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Range(s, e) if s == e => write!(f, "{s}"),
            Self::Range(s, e) => write!(f, "{s}-{e}"),
        }
    }
}

/// Operating mode of a device file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    /// One core
    Single,
    /// Two or more contiguous cores addressed as one logical unit
    Fusion,
    /// The whole device, cores communicating over the interconnect
    MultiCore,
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Fusion => write!(f, "fusion"),
            Self::MultiCore => write!(f, "multicore"),
        }
    }
}

impl FromStr for DeviceMode {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "fusion" => Ok(Self::Fusion),
            "multicore" => Ok(Self::MultiCore),
            _ => Err(DeviceError::parse_error(s, "expected single, fusion or multicore")),
        }
    }
}

/// A device file: the OS path through which a process locks and accesses
/// one or more cores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceFile {
    device_index: u8,
    core_range: CoreRange,
    mode: DeviceMode,
    path: PathBuf,
}

impl DeviceFile {
    /// Create a device file from already-decoded parts.
    pub fn new(
        path: impl Into<PathBuf>,
        device_index: u8,
        core_range: CoreRange,
        mode: DeviceMode,
    ) -> Self {
        Self {
            device_index,
            core_range,
            mode,
            path: path.into(),
        }
    }

    /// Create a device file at `dir/name`, decoding range and mode from the name.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::InvalidInput` if `name` is not a device file name.
    pub fn from_name(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let parsed = naming::parse_name(name)?;
        Ok(Self::new(
            dir.as_ref().join(name),
            parsed.device_index,
            parsed.core_range,
            parsed.mode,
        ))
    }

    /// Path to the device file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name (e.g. `npu0pe0` for `/dev/npu0pe0`), empty if the path has none.
    #[must_use]
    pub fn filename(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Owning device index.
    #[must_use]
    pub const fn device_index(&self) -> u8 {
        self.device_index
    }

    /// Cores this file may occupy.
    #[must_use]
    pub const fn core_range(&self) -> CoreRange {
        self.core_range
    }

    /// Operating mode.
    #[must_use]
    pub const fn mode(&self) -> DeviceMode {
        self.mode
    }
}

impl fmt::Display for DeviceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.filename())
    }
}

/// Validated cores and device files of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreTopology {
    device_index: u8,
    arch: Arch,
    cores: Vec<CoreIdx>,
    dev_files: Vec<DeviceFile>,
}

impl CoreTopology {
    /// Validate a raw device file listing and build the topology.
    ///
    /// Files are returned sorted by core range, ties broken by path.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::UnexpectedValue` if `core_num` exceeds what the
    /// architecture has, or if any file belongs to another device, has a range
    /// outside `[0, core_num)`, contradicts its mode or name, duplicates
    /// another path, or if some core is covered by no file.
    pub fn build(
        device_index: u8,
        arch: Arch,
        core_num: u8,
        files: Vec<DeviceFile>,
    ) -> Result<Self> {
        // Fewer cores than the chip has is fine (partially fused parts)
        if core_num > arch.core_count() {
            return Err(DeviceError::unexpected_value(format!(
                "npu{device_index}: {arch} has {} cores, {core_num} reported",
                arch.core_count()
            )));
        }

        let mut seen = HashSet::with_capacity(files.len());
        let mut covered = vec![false; usize::from(core_num)];

        for file in &files {
            validate_file(device_index, arch, core_num, file)?;

            if !seen.insert(file.path()) {
                return Err(DeviceError::unexpected_value(format!(
                    "{} listed twice for npu{device_index}",
                    file.path().display()
                )));
            }

            if let Some((s, e)) = file.core_range().bounds(core_num) {
                for slot in &mut covered[usize::from(s)..=usize::from(e)] {
                    *slot = true;
                }
            }
        }

        if let Some(core) = covered.iter().position(|c| !c) {
            return Err(DeviceError::unexpected_value(format!(
                "core {core} of npu{device_index} is not exposed by any device file"
            )));
        }

        let mut dev_files = files;
        dev_files.sort_by(|a, b| {
            a.core_range()
                .cmp(&b.core_range())
                .then_with(|| a.path().cmp(b.path()))
        });

        tracing::debug!(
            "npu{device_index}: {core_num} cores, {} device files",
            dev_files.len()
        );

        Ok(Self {
            device_index,
            arch,
            cores: (0..core_num).collect(),
            dev_files,
        })
    }

    /// Owning device index.
    #[must_use]
    pub const fn device_index(&self) -> u8 {
        self.device_index
    }

    /// Architecture the topology was validated against.
    #[must_use]
    pub const fn arch(&self) -> Arch {
        self.arch
    }

    /// Dense core count.
    #[must_use]
    pub fn core_num(&self) -> u8 {
        // cores was built from 0..core_num
        u8::try_from(self.cores.len()).unwrap_or(u8::MAX)
    }

    /// Core indices, ascending.
    #[must_use]
    pub fn core_ids(&self) -> &[CoreIdx] {
        &self.cores
    }

    /// Whether `core` exists on this device.
    #[must_use]
    pub fn has_core(&self, core: CoreIdx) -> bool {
        core < self.core_num()
    }

    /// Device files, sorted by core range.
    #[must_use]
    pub fn dev_files(&self) -> &[DeviceFile] {
        &self.dev_files
    }

    /// Device files whose range includes `core`.
    pub fn files_covering(&self, core: CoreIdx) -> impl Iterator<Item = &DeviceFile> + '_ {
        self.dev_files
            .iter()
            .filter(move |f| f.core_range().contains(core))
    }

    /// Look up a device file by name (`npu0pe1-2`).
    #[must_use]
    pub fn file_by_name(&self, name: &str) -> Option<&DeviceFile> {
        self.dev_files.iter().find(|f| f.filename() == name)
    }
}

fn validate_file(device_index: u8, arch: Arch, core_num: u8, file: &DeviceFile) -> Result<()> {
    let bad = |why: String| {
        Err(DeviceError::unexpected_value(format!("{}: {why}", file.path().display())))
    };

    if file.device_index() != device_index {
        return bad(format!(
            "listed for npu{device_index} but belongs to npu{}",
            file.device_index()
        ));
    }

    match (file.mode(), file.core_range()) {
        (DeviceMode::MultiCore, CoreRange::All) => {}
        (DeviceMode::MultiCore, range) => {
            return bad(format!("multicore file must cover all cores, covers {range}"));
        }
        (mode, CoreRange::All) => {
            return bad(format!("{mode} file cannot cover all cores"));
        }
        (mode, CoreRange::Range(s, e)) => {
            if s > e || e >= core_num {
                return bad(format!("range {s}-{e} outside [0, {core_num})"));
            }
            let count = e - s + 1;
            match mode {
                DeviceMode::Single if count != 1 => {
                    return bad(format!("single file covers {count} cores"));
                }
                DeviceMode::Fusion if count < 2 || !arch.is_fusible_count(count) => {
                    return bad(format!("{arch} cannot fuse {count} cores"));
                }
                _ => {}
            }
        }
    }

    // The path must agree with what its name says
    match naming::parse_name(file.filename()) {
        Ok(named) if named.render() != file.filename() => {
            return bad(format!("name is not canonical, expected {}", named.render()));
        }
        Ok(named)
            if named.device_index == file.device_index()
                && named.core_range == file.core_range()
                && named.mode == file.mode() => {}
        Ok(named) => {
            return bad(format!(
                "name denotes {} {} but file reports {} {}",
                named.mode,
                named.core_range,
                file.mode(),
                file.core_range()
            ));
        }
        Err(_) => return bad("name does not follow the device file grammar".to_string()),
    }

    Ok(())
}
