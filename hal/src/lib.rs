//! # Tandem Device Collaborators
//!
//! Concrete [`DeviceContext`](tandem_core::DeviceContext) and
//! [`CopyBackend`](tandem_core::CopyBackend) implementations.
//!
//! - [`HostContext`]: device execution disabled; every compute kernel runs on
//!   the host and the residency engine never touches a backend
//! - [`SimulatedDevice`]: a device whose memory is an in-process arena,
//!   with per-operation counters for inspection
//!
//! Real accelerator backends live outside this workspace and plug in through
//! the same two traits.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

pub mod host;
pub mod simulated;

// Re-exports
pub use host::HostContext;
pub use simulated::{SimulatedConfig, SimulatedDevice, TransferStats};
