//! NPU architectures and their core layout.
//!
//! The architecture is never inferred from core counts or file layouts. It is
//! reported by the platform (`device_type` + `soc_rev` management attributes)
//! and anything this crate does not know is an [`UnknownArch`], never coerced
//! into a neighbouring generation.

use std::fmt;
use std::str::FromStr;

/// NPU silicon generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arch {
    /// Warboy (B0 silicon), 2 PEs fusible as one pair.
    Warboy,
    /// RNGD, 8 PEs fusible in groups of 2 or 4.
    Rngd,
}

/// Every architecture this model recognizes, in enumeration order.
pub const ALL_ARCHS: &[Arch] = &[Arch::Warboy, Arch::Rngd];

impl Arch {
    /// Identify the architecture from the platform's `device_type` and
    /// `soc_rev` attributes.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownArch`] carrying both raw strings when the pair is not
    /// a supported generation (e.g. Warboy A0 engineering samples).
    pub fn from_platform(device_type: &str, soc_rev: &str) -> Result<Self, UnknownArch> {
        let kind = device_type.trim().to_ascii_lowercase();
        let rev = soc_rev.trim().to_ascii_lowercase();

        match (kind.as_str(), rev.as_str()) {
            ("warboy", "b0" | "") => Ok(Self::Warboy),
            ("rngd", _) => Ok(Self::Rngd),
            _ => Err(UnknownArch {
                device_type: device_type.trim().to_string(),
                soc_rev: soc_rev.trim().to_string(),
            }),
        }
    }

    /// Number of processing elements (cores) on one device.
    #[must_use]
    pub const fn core_count(&self) -> u8 {
        match self {
            Self::Warboy => 2,
            Self::Rngd => 8,
        }
    }

    /// Whether `count` contiguous cores may be fused into one logical unit.
    ///
    /// A single core is never a fusion group.
    #[must_use]
    pub const fn is_fusible_count(&self, count: u8) -> bool {
        match self {
            Self::Warboy => matches!(count, 2),
            Self::Rngd => matches!(count, 2 | 4),
        }
    }

    /// Directory (relative to the devfs root) holding this family's device files.
    #[must_use]
    pub const fn devfs_subdir(&self) -> Option<&'static str> {
        match self {
            Self::Warboy => None,
            Self::Rngd => Some("rngd"),
        }
    }

    /// Management directory (relative to the sysfs root) of device `index`.
    #[must_use]
    pub fn mgmt_dir(&self, index: u8) -> String {
        match self {
            Self::Warboy => format!("class/npu_mgmt/npu{index}_mgmt"),
            Self::Rngd => format!("class/rngd_mgmt/rngd!npu{index}mgmt"),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Same spelling as the compiler's npu-id
        match self {
            Self::Warboy => write!(f, "warboy"),
            Self::Rngd => write!(f, "rngd"),
        }
    }
}

impl FromStr for Arch {
    type Err = UnknownArch;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warboy" | "warboyb0" | "warboy-b0" => Ok(Self::Warboy),
            "rngd" => Ok(Self::Rngd),
            _ => Err(UnknownArch {
                device_type: s.trim().to_string(),
                soc_rev: String::new(),
            }),
        }
    }
}

/// Architecture strings the model does not recognize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownArch {
    /// Raw `device_type` value
    pub device_type: String,
    /// Raw `soc_rev` value (empty when parsed from a single name)
    pub soc_rev: String,
}

impl fmt::Display for UnknownArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown architecture: {} (rev: {})",
            self.device_type, self.soc_rev
        )
    }
}

impl std::error::Error for UnknownArch {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_platform() {
        assert_eq!(Arch::from_platform("Warboy", "B0"), Ok(Arch::Warboy));
        assert_eq!(Arch::from_platform("warboy\n", "b0\n"), Ok(Arch::Warboy));
        assert_eq!(Arch::from_platform("RNGD", "A0"), Ok(Arch::Rngd));

        let err = Arch::from_platform("Warboy", "A0").unwrap_err();
        assert_eq!(err.device_type, "Warboy");
        assert_eq!(err.soc_rev, "A0");
        assert!(Arch::from_platform("U250", "").is_err());
    }

    #[test]
    fn test_from_str_any_casing() {
        assert_eq!("Warboy".parse::<Arch>(), Ok(Arch::Warboy));
        assert_eq!("WarboyB0".parse::<Arch>(), Ok(Arch::Warboy));
        assert_eq!("rNgD".parse::<Arch>(), Ok(Arch::Rngd));
        assert!("renegade".parse::<Arch>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for arch in ALL_ARCHS {
            assert_eq!(arch.to_string().parse::<Arch>(), Ok(*arch));
        }
    }

    #[test]
    fn test_fusion_granularity() {
        assert!(!Arch::Warboy.is_fusible_count(1));
        assert!(Arch::Warboy.is_fusible_count(2));
        assert!(!Arch::Warboy.is_fusible_count(4));

        assert!(Arch::Rngd.is_fusible_count(2));
        assert!(!Arch::Rngd.is_fusible_count(3));
        assert!(Arch::Rngd.is_fusible_count(4));
        assert!(!Arch::Rngd.is_fusible_count(8));
    }

    #[test]
    fn test_family_layout() {
        assert_eq!(Arch::Warboy.devfs_subdir(), None);
        assert_eq!(Arch::Rngd.devfs_subdir(), Some("rngd"));
        assert_eq!(Arch::Warboy.mgmt_dir(3), "class/npu_mgmt/npu3_mgmt");
        assert_eq!(Arch::Rngd.mgmt_dir(3), "class/rngd_mgmt/rngd!npu3mgmt");
    }
}
