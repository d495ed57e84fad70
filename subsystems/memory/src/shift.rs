//! # Debug Address Shifter
//!
//! Diagnostic transform applied to every address the registry hands out.
//!
//! With the shifter on, registry keys live `2^48` bytes above the host
//! buffers they name:
//!
//! ```text
//! 0x0000_0000_0000_0000  ┌────────────────────┐
//!                        │  Host buffers      │ ◄── raw addresses (records)
//! 0x0000_7FFF_FFFF_FFFF  ├────────────────────┤
//!                        │  unmapped          │
//! 0x0001_0000_0000_0000  ├────────────────────┤
//!                        │  Registry keys     │ ◄── shifted, never mapped
//!                        └────────────────────┘
//! ```
//!
//! Code that dereferences a key without going through the manager touches
//! the unmapped window and faults on the spot instead of reading whatever
//! the buffer held. Disabled, the transform is the identity.
//!
//! The process-wide setting comes from the `TANDEM_XS` environment variable
//! and is read once, at first use.

use spin::Once;
use tandem_core::HostAddr;

/// Offset applied to shifted addresses
pub const SHIFT: u64 = 1 << 48;

/// Environment variable enabling the shifter
pub const ENV_VAR: &str = "TANDEM_XS";

static PROCESS_SHIFTER: Once<AddressShifter> = Once::new();

/// Address shifting mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressShifter {
    /// Keys are the host addresses themselves
    #[default]
    Disabled,
    /// Keys are host addresses plus [`SHIFT`]
    Enabled,
}

impl AddressShifter {
    /// Check if shifting is active
    #[inline]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }

    /// Host address to registry key
    #[inline]
    pub const fn shift(self, addr: HostAddr) -> HostAddr {
        match self {
            Self::Disabled => addr,
            Self::Enabled => addr.offset(SHIFT),
        }
    }

    /// Registry key to host address
    #[inline]
    pub const fn unshift(self, key: HostAddr) -> HostAddr {
        match self {
            Self::Disabled => key,
            Self::Enabled => HostAddr::new(key.raw().wrapping_sub(SHIFT as usize)),
        }
    }

    /// Interpret the value of [`ENV_VAR`]
    ///
    /// Presence enables the shifter, including an empty value; `0`, `false`,
    /// `off` and `no` disable it.
    pub fn from_env_value(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::Disabled;
        };

        let value = value.trim();
        let off = ["0", "false", "off", "no"]
            .iter()
            .any(|v| value.eq_ignore_ascii_case(v));

        if off {
            Self::Disabled
        } else {
            Self::Enabled
        }
    }

    /// Process-wide shifter, read from the environment on first call
    pub fn process() -> Self {
        *PROCESS_SHIFTER.call_once(|| {
            let shifter = read_environment();
            if shifter.is_enabled() {
                log::info!(
                    "address shifter enabled: registry keys offset by {:#x}",
                    SHIFT
                );
            }
            shifter
        })
    }
}

#[cfg(feature = "std")]
fn read_environment() -> AddressShifter {
    let value = std::env::var(ENV_VAR).ok();
    AddressShifter::from_env_value(value.as_deref())
}

#[cfg(not(feature = "std"))]
fn read_environment() -> AddressShifter {
    AddressShifter::Disabled
}

// =============================================================================
// TESTS
// =============================================================================
