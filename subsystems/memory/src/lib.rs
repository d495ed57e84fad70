//! # Tandem Memory Subsystem
//!
//! Host/device residency engine: tracks host buffers, gives them device
//! mirrors on demand and keeps the two sides in sync when asked to.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          MemoryManager                           │
//! │                                                                  │
//! │  ┌──────────────────────┐          ┌──────────────────────────┐  │
//! │  │   AddressRegistry    │◄─────────│        SyncEngine        │  │
//! │  │  key → MemoryRecord  │          │ materialize / push / pull│  │
//! │  │  ┌────────────────┐  │          │ raw h2d / d2h / d2d      │  │
//! │  │  │   RangeIndex   │  │          └────────────┬─────────────┘  │
//! │  │  └────────────────┘  │                       │                │
//! │  └──────────────────────┘                       ▼                │
//! │            ▲                         DeviceContext + CopyBackend │
//! │            │ keys                                                │
//! │  ┌─────────┴────────────┐          ┌──────────────────────────┐  │
//! │  │   AddressShifter     │          │  CheckedAddr / FailFast  │  │
//! │  └──────────────────────┘          └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`registry`]: key → record map, sub-range auto-registration
//! - [`range`]: enclosing-block lookup for interior pointers
//! - [`sync`]: device mirrors and explicit transfers
//! - [`shift`]: debug address shifter
//! - [`checked`]: bounds- and staleness-checked handles
//! - [`config`]: manager configuration
//! - [`fatal`]: fail-fast adapter
//! - [`manager`]: the [`MemoryManager`] facade

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod checked;
pub mod config;
pub mod fatal;
pub mod manager;
pub mod range;
pub mod registry;
pub mod shift;
pub mod sync;

// Re-exports
pub use checked::CheckedAddr;
pub use config::ManagerConfig;
pub use fatal::FailFast;
pub use manager::{MemoryManager, MemoryStats};
pub use registry::{AddressRegistry, MemoryRecord, RecordFlags, RecordId, Residency};
pub use shift::AddressShifter;
pub use sync::{SyncEngine, SyncStats};

/// Prelude for numerical code driving the manager
pub mod prelude {
    pub use crate::checked::CheckedAddr;
    pub use crate::config::ManagerConfig;
    pub use crate::fatal::FailFast;
    pub use crate::manager::MemoryManager;
    pub use tandem_core::{ByteSize, CopyFlags, Device, DeviceAddr, Error, HostAddr, Result};
}

static_assertions::assert_impl_all!(MemoryRecord: Send, Sync, Copy);
static_assertions::assert_impl_all!(CheckedAddr: Send, Sync, Copy);
static_assertions::assert_impl_all!(AddressShifter: Send, Sync, Copy);
