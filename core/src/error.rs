//! # Tandem Error Handling
//!
//! Error types for the residency engine and its collaborators.
//!
//! The registry errors describe misuse of a buffer lifecycle by the calling
//! numerical code. They are returned, never raised; callers that want the
//! abort-on-misuse behaviour wrap results in the memory crate's fail-fast
//! adapter.

use core::fmt;

use crate::types::{DeviceAddr, HostAddr};

// =============================================================================
// RESULT TYPE
// =============================================================================

/// Tandem Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// Tandem unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Registry Errors
    // =========================================================================
    /// Address is already registered
    DuplicateRegistration {
        /// Registry key that was already present
        addr: HostAddr,
        /// The existing entry is a sub-range record
        ranged: bool,
    },
    /// Address has no registry entry and no enclosing block
    UnknownAddress(HostAddr),
    /// `count * element_size` does not fit in a byte size
    InvalidSize,
    /// Checked handle points past the end of its record
    OutOfBounds,
    /// Checked handle refers to an erased or re-registered record
    StaleHandle,

    // =========================================================================
    // Device Errors
    // =========================================================================
    /// Device execution requested but the backend failed to initialize
    DeviceUnavailable,
    /// Device allocation failed
    AllocationFailed,
    /// Device memory exhausted
    OutOfDeviceMemory,
    /// Device address is not inside any live device allocation
    InvalidDeviceAddress(DeviceAddr),
    /// Operation not supported by this backend
    NotSupported,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Registry
            Self::DuplicateRegistration { addr, ranged: false } => {
                write!(f, "address {} is already registered", addr)
            },
            Self::DuplicateRegistration { addr, ranged: true } => {
                write!(f, "address {} is already registered as a sub-range", addr)
            },
            Self::UnknownAddress(addr) => write!(f, "unknown address {}", addr),
            Self::InvalidSize => write!(f, "registration size overflows"),
            Self::OutOfBounds => write!(f, "checked address out of bounds"),
            Self::StaleHandle => write!(f, "stale checked handle"),

            // Device
            Self::DeviceUnavailable => write!(f, "device backend unavailable"),
            Self::AllocationFailed => write!(f, "device allocation failed"),
            Self::OutOfDeviceMemory => write!(f, "out of device memory"),
            Self::InvalidDeviceAddress(addr) => write!(f, "invalid device address {}", addr),
            Self::NotSupported => write!(f, "operation not supported"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl Error {
    /// Check if this error reports a misuse of the buffer lifecycle
    pub const fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::DuplicateRegistration { .. }
                | Self::UnknownAddress(_)
                | Self::OutOfBounds
                | Self::StaleHandle
        )
    }
}
