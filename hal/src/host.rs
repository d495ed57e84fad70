//! # Host-Only Context
//!
//! Device execution disabled. Raw copies degrade to host `memcpy` inside the
//! engine, so the backend half of this type is never reached.

use tandem_core::{
    ByteSize, CopyBackend, DeviceAddr, DeviceContext, Error, HostAddr, Result, StreamHandle,
};

/// Context for processes without an accelerator
#[derive(Debug, Clone, Copy, Default)]
pub struct HostContext;

impl HostContext {
    /// Create a host-only context
    pub const fn new() -> Self {
        Self
    }
}

impl DeviceContext for HostContext {
    fn setup(&self) -> Result<()> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn stream(&self) -> StreamHandle {
        StreamHandle::null()
    }
}

impl CopyBackend for HostContext {
    fn allocate(&self, _size: ByteSize) -> Result<DeviceAddr> {
        Err(Error::DeviceUnavailable)
    }

    fn free(&self, addr: DeviceAddr) -> Result<()> {
        Err(Error::InvalidDeviceAddress(addr))
    }

    unsafe fn copy_h2d(
        &self,
        _dest: DeviceAddr,
        _src: HostAddr,
        _bytes: ByteSize,
        _stream: Option<StreamHandle>,
    ) -> Result<()> {
        Err(Error::NotSupported)
    }

    unsafe fn copy_d2h(
        &self,
        _dest: HostAddr,
        _src: DeviceAddr,
        _bytes: ByteSize,
        _stream: Option<StreamHandle>,
    ) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn copy_d2d(
        &self,
        _dest: DeviceAddr,
        _src: DeviceAddr,
        _bytes: ByteSize,
        _stream: Option<StreamHandle>,
    ) -> Result<()> {
        Err(Error::NotSupported)
    }
}
