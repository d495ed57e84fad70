//! # Sync Engine
//!
//! Decides when a record gets a device mirror and moves bytes between the
//! two sides on request.
//!
//! ## Record Lifecycle
//!
//! ```text
//!                 insert                 resolve (device on)
//! Unregistered ──────────► HostResident ─────────────────────► DeviceMaterialized
//!      ▲                        │                                  │    ▲
//!      │          erase         │                         push/pull│    │
//!      └────────────────────────┴──────────────────────────────────┘────┘
//! ```
//!
//! Materialization is the only implicit transfer: it allocates a mirror of
//! the record's own size and copies the host bytes in once. Sub-ranges are
//! no exception; materializing one never touches the enclosing block.
//! Afterwards bytes only move on an explicit push or pull, and the record
//! stays device-authoritative until it is erased.

use tandem_core::{
    ByteSize, CopyFlags, Device, DeviceAddr, Error, HostAddr, Result, StreamHandle,
};

use crate::registry::{AddressRegistry, MemoryRecord};

/// Sync engine statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncStats {
    /// Records given a device mirror
    pub materializations: u64,
    /// Explicit host to device synchronizations
    pub pushes: u64,
    /// Explicit device to host synchronizations
    pub pulls: u64,
    /// Device mirrors freed on erase
    pub releases: u64,
    /// Bytes moved host to device
    pub bytes_to_device: u64,
    /// Bytes moved device to host
    pub bytes_to_host: u64,
    /// Bytes moved device to device
    pub bytes_on_device: u64,
}

/// Residency and transfer policy over a [`Device`]
#[derive(Debug)]
pub struct SyncEngine<D: Device> {
    /// Context and copy backend
    device: D,
    /// `setup` has succeeded
    ready: bool,
    /// Queue the materialization copy on the context stream
    async_materialize: bool,
    /// Statistics
    stats: SyncStats,
}

impl<D: Device> SyncEngine<D> {
    /// Create an engine over `device`
    pub fn new(device: D, async_materialize: bool) -> Self {
        Self {
            device,
            ready: false,
            async_materialize,
            stats: SyncStats::default(),
        }
    }

    /// Get the device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Check if device execution is enabled
    pub fn is_enabled(&self) -> bool {
        self.device.is_enabled()
    }

    /// Get statistics
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Bring the backend up on first use
    pub fn ensure_ready(&mut self) -> Result<()> {
        if self.ready {
            return Ok(());
        }
        self.device.setup().map_err(|err| {
            log::error!("device setup failed: {}", err);
            Error::DeviceUnavailable
        })?;
        self.ready = true;
        Ok(())
    }

    // =========================================================================
    // Materialization
    // =========================================================================

    /// Device address of the record under `key`, creating the mirror on
    /// first use
    pub fn materialize(&mut self, registry: &mut AddressRegistry, key: HostAddr) -> Result<DeviceAddr> {
        self.ensure_ready()?;

        let record = *registry.require(key)?;
        if record.is_materialized() {
            return Ok(record.device());
        }

        if record.size().is_zero() {
            Self::mark(registry, key, |r| r.materialize(DeviceAddr::null()));
            log::debug!("materialized empty record {}", key);
            return Ok(DeviceAddr::null());
        }

        let device = self.device.allocate(record.size())?;
        let stream = self.async_materialize.then(|| self.device.stream());
        // SAFETY: registration guarantees the host region is readable until erase
        let copied = unsafe { self.device.copy_h2d(device, record.host(), record.size(), stream) };
        if let Err(err) = copied {
            if let Err(free_err) = self.device.free(device) {
                log::warn!("leaking device block {} after failed copy: {}", device, free_err);
            }
            return Err(err);
        }

        Self::mark(registry, key, |r| r.materialize(device));
        self.stats.materializations += 1;
        self.stats.bytes_to_device += record.size().as_bytes();
        log::debug!("materialized {} ({}) at {}", key, record.size(), device);

        Ok(device)
    }

    fn mark(registry: &mut AddressRegistry, key: HostAddr, f: impl FnOnce(&mut MemoryRecord)) {
        if let Some(record) = registry.get_mut(key) {
            f(record);
        }
    }

    /// Free the device mirror of a record being erased
    pub fn release(&mut self, record: &MemoryRecord) -> Result<()> {
        if !record.owns_mirror() {
            return Ok(());
        }
        self.device.free(record.device())?;
        self.stats.releases += 1;
        Ok(())
    }

    // =========================================================================
    // Explicit Synchronization
    // =========================================================================

    /// Copy the host bytes of a materialized record to its mirror
    pub fn push(&mut self, registry: &AddressRegistry, key: HostAddr) -> Result<()> {
        let record = registry.require(key)?;
        if !record.is_materialized() || record.size().is_zero() {
            return Ok(());
        }

        // SAFETY: registration guarantees the host region is readable until erase
        unsafe {
            self.device
                .copy_h2d(record.device(), record.host(), record.size(), None)?;
        }
        self.stats.pushes += 1;
        self.stats.bytes_to_device += record.size().as_bytes();
        Ok(())
    }

    /// Copy the mirror of a materialized record back to host memory
    pub fn pull(&mut self, registry: &AddressRegistry, key: HostAddr) -> Result<()> {
        let record = registry.require(key)?;
        if !record.is_materialized() || record.size().is_zero() {
            return Ok(());
        }

        // SAFETY: registration guarantees the host region is writable until erase
        unsafe {
            self.device
                .copy_d2h(record.host(), record.device(), record.size(), None)?;
        }
        self.stats.pulls += 1;
        self.stats.bytes_to_host += record.size().as_bytes();
        Ok(())
    }

    // =========================================================================
    // Raw Copies
    // =========================================================================

    fn stream_for(&self, flags: CopyFlags) -> Option<StreamHandle> {
        flags
            .contains(CopyFlags::ASYNC)
            .then(|| self.device.stream())
    }

    /// Raw host to device copy
    ///
    /// # Safety
    /// `src` must be readable for `bytes` bytes. With device execution
    /// disabled `dest` is a host address and must be writable for `bytes`
    /// bytes.
    pub unsafe fn copy_h2d(
        &mut self,
        dest: DeviceAddr,
        src: HostAddr,
        bytes: ByteSize,
        flags: CopyFlags,
    ) -> Result<DeviceAddr> {
        if bytes.is_zero() {
            return Ok(dest);
        }
        log::trace!("h2d {} -> {} ({})", src, dest, bytes);

        if !self.is_enabled() {
            // SAFETY: forwarded from the caller
            unsafe { host_copy(dest.as_host(), src, bytes) };
            return Ok(dest);
        }

        self.ensure_ready()?;
        let stream = self.stream_for(flags);
        // SAFETY: forwarded from the caller
        unsafe { self.device.copy_h2d(dest, src, bytes, stream)? };
        self.stats.bytes_to_device += bytes.as_bytes();
        Ok(dest)
    }

    /// Raw device to host copy
    ///
    /// # Safety
    /// `dest` must be writable for `bytes` bytes. With device execution
    /// disabled `src` is a host address and must be readable for `bytes`
    /// bytes.
    pub unsafe fn copy_d2h(
        &mut self,
        dest: HostAddr,
        src: DeviceAddr,
        bytes: ByteSize,
        flags: CopyFlags,
    ) -> Result<HostAddr> {
        if bytes.is_zero() {
            return Ok(dest);
        }
        log::trace!("d2h {} -> {} ({})", src, dest, bytes);

        if !self.is_enabled() {
            // SAFETY: forwarded from the caller
            unsafe { host_copy(dest, src.as_host(), bytes) };
            return Ok(dest);
        }

        self.ensure_ready()?;
        let stream = self.stream_for(flags);
        // SAFETY: forwarded from the caller
        unsafe { self.device.copy_d2h(dest, src, bytes, stream)? };
        self.stats.bytes_to_host += bytes.as_bytes();
        Ok(dest)
    }

    /// Raw device to device copy
    ///
    /// # Safety
    /// With device execution disabled both addresses are host addresses:
    /// `src` must be readable and `dest` writable for `bytes` bytes.
    pub unsafe fn copy_d2d(
        &mut self,
        dest: DeviceAddr,
        src: DeviceAddr,
        bytes: ByteSize,
        flags: CopyFlags,
    ) -> Result<DeviceAddr> {
        if bytes.is_zero() {
            return Ok(dest);
        }
        log::trace!("d2d {} -> {} ({})", src, dest, bytes);

        if !self.is_enabled() {
            // SAFETY: forwarded from the caller
            unsafe { host_copy(dest.as_host(), src.as_host(), bytes) };
            return Ok(dest);
        }

        self.ensure_ready()?;
        let stream = self.stream_for(flags);
        self.device.copy_d2d(dest, src, bytes, stream)?;
        self.stats.bytes_on_device += bytes.as_bytes();
        Ok(dest)
    }
}

/// Byte copy within the host address space; regions may overlap
///
/// # Safety
/// `src` readable and `dest` writable for `bytes` bytes.
unsafe fn host_copy(dest: HostAddr, src: HostAddr, bytes: ByteSize) {
    // SAFETY: forwarded from the caller
    unsafe {
        core::ptr::copy(src.as_ptr::<u8>(), dest.as_mut_ptr::<u8>(), bytes.as_usize());
    }
}

// =============================================================================
// TESTS
// =============================================================================
