//! # Tandem Collaborator Traits
//!
//! The two interfaces the residency engine consumes but does not implement.
//!
//! ## Trait Hierarchy
//!
//! ```text
//! Device
//!    │
//!    ├── DeviceContext (enabled?, setup, stream)
//!    │
//!    └── CopyBackend
//!           │
//!           ├── allocate / free
//!           └── copy_h2d / copy_d2h / copy_d2d  (sync or on a stream)
//! ```
//!
//! Both traits take `&self`. Implementations that keep mutable state use
//! interior mutability; the engine itself is single-threaded.

use crate::error::Result;
use crate::types::*;

// =============================================================================
// DEVICE CONTEXT
// =============================================================================

/// Device execution context
///
/// Reports whether device execution is enabled and lazily brings the
/// backend up.
pub trait DeviceContext {
    /// Initialize the device backend
    ///
    /// Must be idempotent: the engine calls it before every first use of the
    /// device and relies on repeated calls being cheap.
    fn setup(&self) -> Result<()>;

    /// Check if compute kernels run on the device
    fn is_enabled(&self) -> bool;

    /// Stream on which asynchronous copies are queued
    fn stream(&self) -> StreamHandle;
}

// =============================================================================
// RAW COPY BACKEND
// =============================================================================

bitflags::bitflags! {
    /// Flags for raw copy primitives
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CopyFlags: u32 {
        /// Queue the copy on the context stream and return immediately
        const ASYNC = 1 << 0;
    }
}

/// Raw device allocation and copy primitives
///
/// `stream` selects the flavour of every copy: `None` blocks until the copy
/// has completed, `Some` queues it and returns. Completion of queued copies
/// is the caller's business.
pub trait CopyBackend {
    /// Allocate `size` bytes of device memory
    fn allocate(&self, size: ByteSize) -> Result<DeviceAddr>;

    /// Release device memory returned by [`CopyBackend::allocate`]
    fn free(&self, addr: DeviceAddr) -> Result<()>;

    /// Copy `bytes` from host memory to device memory
    ///
    /// # Safety
    /// `src` must be valid for reads of `bytes` bytes.
    unsafe fn copy_h2d(
        &self,
        dest: DeviceAddr,
        src: HostAddr,
        bytes: ByteSize,
        stream: Option<StreamHandle>,
    ) -> Result<()>;

    /// Copy `bytes` from device memory to host memory
    ///
    /// # Safety
    /// `dest` must be valid for writes of `bytes` bytes.
    unsafe fn copy_d2h(
        &self,
        dest: HostAddr,
        src: DeviceAddr,
        bytes: ByteSize,
        stream: Option<StreamHandle>,
    ) -> Result<()>;

    /// Copy `bytes` between two device locations
    fn copy_d2d(
        &self,
        dest: DeviceAddr,
        src: DeviceAddr,
        bytes: ByteSize,
        stream: Option<StreamHandle>,
    ) -> Result<()>;
}

/// A complete device: context plus copy backend
pub trait Device: DeviceContext + CopyBackend {}

impl<T: DeviceContext + CopyBackend + ?Sized> Device for T {}

// =============================================================================
// BORROWED COLLABORATORS
// =============================================================================

impl<T: DeviceContext + ?Sized> DeviceContext for &T {
    fn setup(&self) -> Result<()> {
        (**self).setup()
    }

    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }

    fn stream(&self) -> StreamHandle {
        (**self).stream()
    }
}

impl<T: CopyBackend + ?Sized> CopyBackend for &T {
    fn allocate(&self, size: ByteSize) -> Result<DeviceAddr> {
        (**self).allocate(size)
    }

    fn free(&self, addr: DeviceAddr) -> Result<()> {
        (**self).free(addr)
    }

    unsafe fn copy_h2d(
        &self,
        dest: DeviceAddr,
        src: HostAddr,
        bytes: ByteSize,
        stream: Option<StreamHandle>,
    ) -> Result<()> {
        // SAFETY: forwarded caller contract
        unsafe { (**self).copy_h2d(dest, src, bytes, stream) }
    }

    unsafe fn copy_d2h(
        &self,
        dest: HostAddr,
        src: DeviceAddr,
        bytes: ByteSize,
        stream: Option<StreamHandle>,
    ) -> Result<()> {
        // SAFETY: forwarded caller contract
        unsafe { (**self).copy_d2h(dest, src, bytes, stream) }
    }

    fn copy_d2d(
        &self,
        dest: DeviceAddr,
        src: DeviceAddr,
        bytes: ByteSize,
        stream: Option<StreamHandle>,
    ) -> Result<()> {
        (**self).copy_d2d(dest, src, bytes, stream)
    }
}

// =============================================================================
// STATIC ASSERTIONS
// =============================================================================

// Ensure key types are Send + Sync
static_assertions::assert_impl_all!(HostAddr: Send, Sync, Copy);
static_assertions::assert_impl_all!(DeviceAddr: Send, Sync, Copy);
static_assertions::assert_impl_all!(ByteSize: Send, Sync, Copy);
static_assertions::assert_impl_all!(StreamHandle: Send, Sync, Copy);
