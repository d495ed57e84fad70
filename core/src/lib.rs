//! # Tandem Core
//!
//! Foundational types shared by the host/device memory residency engine.
//!
//! This crate fixes the vocabulary the rest of the workspace speaks:
//!
//! - **Addresses**: [`HostAddr`] and [`DeviceAddr`] are distinct types, so a
//!   host pointer can never be handed to a device copy by accident
//! - **Sizes**: [`ByteSize`] for every extent the registry tracks
//! - **Handles**: [`Handle`] for opaque, typed identifiers
//! - **Collaborators**: [`DeviceContext`] and [`CopyBackend`], the two
//!   interfaces the engine consumes but does not implement
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        tandem-core                          │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   Traits    │  │   Types     │  │       Error         │  │
//! │  │ (Context,   │  │ (HostAddr,  │  │     Handling        │  │
//! │  │  Backend)   │  │  DeviceAddr)│  │                     │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "std")]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod error;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
