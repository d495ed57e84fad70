//! # Manager Configuration
//!
//! Knobs fixed for the lifetime of a [`MemoryManager`](crate::MemoryManager).

use crate::shift::AddressShifter;

/// Memory manager configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Debug address shifter
    pub shifter: AddressShifter,
    /// Queue the first host to device copy of a record on the context stream
    pub async_materialize: bool,
    /// Require registered addresses in `resolve` even with the device disabled
    pub strict_host_lookup: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            shifter: AddressShifter::process(),
            async_materialize: true,
            strict_host_lookup: false,
        }
    }
}

impl ManagerConfig {
    /// Defaults without consulting the environment
    pub const fn plain() -> Self {
        Self {
            shifter: AddressShifter::Disabled,
            async_materialize: true,
            strict_host_lookup: false,
        }
    }

    /// Defaults with the address shifter forced on
    pub const fn shifted() -> Self {
        Self {
            shifter: AddressShifter::Enabled,
            ..Self::plain()
        }
    }

    /// Apply a space-separated option string on top of the defaults
    ///
    /// Recognized options:
    /// - `xs` / `noxs`: force the address shifter on or off
    /// - `sync` / `async`: flavour of the materialization copy
    /// - `strict`: require registered addresses in host mode
    pub fn from_options(options: &str) -> Self {
        let mut config = Self::default();

        for option in options.split_whitespace() {
            match option {
                "xs" => config.shifter = AddressShifter::Enabled,
                "noxs" => config.shifter = AddressShifter::Disabled,
                "sync" => config.async_materialize = false,
                "async" => config.async_materialize = true,
                "strict" => config.strict_host_lookup = true,
                other => log::warn!("ignoring unknown memory manager option `{}`", other),
            }
        }

        config
    }
}
