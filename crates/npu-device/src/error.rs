//! Error types for NPU topology queries

use thiserror::Error;

/// Result type alias for NPU topology queries
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors that can occur while reading device topology or occupancy
///
/// Every kind is surfaced to the caller as-is. `Unsupported` and
/// `Unavailable` carry different contracts: the first means "skip, this
/// platform will never expose it", the second "not obtainable right now".
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Malformed caller-supplied identifier or name
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the input
        message: String,
    },

    /// No device or device file with that name
    #[error("Device {name} not found")]
    DeviceNotFound {
        /// Name that was looked up
        name: String,
    },

    /// Device found but held exclusively by someone else
    #[error("Device {name} found but still in use")]
    DeviceBusy {
        /// Name of the busy device
        name: String,
    },

    /// Attribute or state not obtainable right now
    #[error("Unavailable: {message}")]
    Unavailable {
        /// What could not be obtained
        message: String,
    },

    /// Attribute not exposed by this platform or architecture at all
    #[error("Unsupported: {attribute} is not exposed by this platform")]
    Unsupported {
        /// Attribute name
        attribute: String,
    },

    /// I/O error reading topology
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Permission denied reading topology
    #[error("Permission denied: {source}")]
    PermissionDenied {
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Architecture reported by the platform is not recognized
    #[error("Unknown architecture, arch: {arch}, rev: {rev}")]
    UnknownArch {
        /// Raw device type
        arch: String,
        /// Raw silicon revision
        rev: String,
    },

    /// Kernel driver exposes something this model cannot work with
    #[error("Incompatible device driver: {cause}")]
    IncompatibleDriver {
        /// What was incompatible
        cause: String,
    },

    /// Topology data violates a model invariant
    #[error("Unexpected value: {message}")]
    UnexpectedValue {
        /// Which invariant was violated
        message: String,
    },

    /// Failed to decode a name or attribute string
    #[error("Failed to parse given message {message}: {cause}")]
    ParseError {
        /// Text that failed to parse
        message: String,
        /// Reason for failure
        cause: String,
    },
}

impl DeviceError {
    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a device not found error
    pub fn device_not_found(name: impl Into<String>) -> Self {
        Self::DeviceNotFound { name: name.into() }
    }

    /// Create a device busy error
    pub fn device_busy(name: impl Into<String>) -> Self {
        Self::DeviceBusy { name: name.into() }
    }

    /// Create an unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create an unsupported attribute error
    pub fn unsupported(attribute: impl Into<String>) -> Self {
        Self::Unsupported {
            attribute: attribute.into(),
        }
    }

    /// Create an incompatible driver error
    pub fn incompatible_driver(cause: impl Into<String>) -> Self {
        Self::IncompatibleDriver {
            cause: cause.into(),
        }
    }

    /// Create an unexpected value error
    pub fn unexpected_value(message: impl Into<String>) -> Self {
        Self::UnexpectedValue {
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse_error(message: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            cause: cause.into(),
        }
    }

    /// Whether the caller should skip this attribute rather than retry
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Whether the same query may succeed if issued again later
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DeviceBusy { .. } | Self::Unavailable { .. } | Self::Io { .. }
        )
    }
}

impl From<std::io::Error> for DeviceError {
    fn from(source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied { source }
        } else {
            Self::Io { source }
        }
    }
}

impl From<npu_chip::UnknownArch> for DeviceError {
    fn from(e: npu_chip::UnknownArch) -> Self {
        Self::UnknownArch {
            arch: e.device_type,
            rev: e.soc_rev,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_error_split() {
        let denied: DeviceError = io::Error::from(io::ErrorKind::PermissionDenied).into();
        assert!(matches!(denied, DeviceError::PermissionDenied { .. }));

        let other: DeviceError = io::Error::from(io::ErrorKind::NotFound).into();
        assert!(matches!(other, DeviceError::Io { .. }));
    }

    #[test]
    fn test_unknown_arch_conversion() {
        let err: DeviceError = npu_chip::Arch::from_platform("Warboy", "A0")
            .unwrap_err()
            .into();
        assert_eq!(err.to_string(), "Unknown architecture, arch: Warboy, rev: A0");
    }

    #[test]
    fn test_caller_contracts_stay_distinct() {
        let unsupported = DeviceError::unsupported("numa_node");
        let unavailable = DeviceError::unavailable("core 1 is not occupied");

        assert!(unsupported.is_unsupported());
        assert!(!unsupported.is_retryable());
        assert!(!unavailable.is_unsupported());
        assert!(unavailable.is_retryable());
    }
}
