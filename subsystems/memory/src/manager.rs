//! # Memory Manager
//!
//! The object numerical code talks to. Owns the registry, the sync engine
//! and the device, and is handed by `&mut` to whatever needs it.
//!
//! ## Typical Flow
//!
//! ```text
//! buffer created ──► insert ──► key
//!                                │
//!        kernel launch ◄── resolve(key)  (first call: allocate + copy in)
//!                                │
//!              push / pull at caller-chosen points
//!                                │
//! buffer dropped ◄──────────── erase
//! ```
//!
//! Every operation returns a [`Result`]; wrap with
//! [`FailFast::or_abort`](crate::FailFast::or_abort) to abort on misuse.

use core::mem;

use tandem_core::{ByteSize, CopyFlags, Device, DeviceAddr, Error, HostAddr, Result};

use crate::checked::CheckedAddr;
use crate::config::ManagerConfig;
use crate::registry::{AddressRegistry, MemoryRecord};
use crate::sync::SyncEngine;

// =============================================================================
// STATISTICS
// =============================================================================

/// Memory manager statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStats {
    /// Explicit registrations
    pub registrations: u64,
    /// Sub-ranges registered by range lookup
    pub sub_ranges: u64,
    /// Erased records
    pub erasures: u64,
    /// Records given a device mirror
    pub materializations: u64,
    /// Explicit pushes
    pub pushes: u64,
    /// Explicit pulls
    pub pulls: u64,
    /// Device mirrors freed
    pub releases: u64,
    /// Bytes moved host to device
    pub bytes_to_device: u64,
    /// Bytes moved device to host
    pub bytes_to_host: u64,
    /// Bytes moved device to device
    pub bytes_on_device: u64,
    /// Live records
    pub live_records: usize,
    /// Bytes covered by live records
    pub live_bytes: u64,
}

// =============================================================================
// MEMORY MANAGER
// =============================================================================

/// Host/device residency manager
#[derive(Debug)]
pub struct MemoryManager<D: Device> {
    config: ManagerConfig,
    registry: AddressRegistry,
    engine: SyncEngine<D>,
}

impl<D: Device> MemoryManager<D> {
    /// Create a manager over `device`
    pub fn new(device: D, config: ManagerConfig) -> Self {
        Self {
            engine: SyncEngine::new(device, config.async_materialize),
            registry: AddressRegistry::new(),
            config,
        }
    }

    /// Create a manager with the process defaults
    pub fn with_defaults(device: D) -> Self {
        Self::new(device, ManagerConfig::default())
    }

    /// Get configuration
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Get the device
    pub fn device(&self) -> &D {
        self.engine.device()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register `count` elements of `element_size` bytes at `host`
    ///
    /// Returns the registry key for the buffer: `host` itself, or its
    /// shifted image when the address shifter is on.
    ///
    /// # Safety
    /// The region must stay valid for reads and writes until it is erased:
    /// materialization, push and pull copy through it.
    pub unsafe fn insert(
        &mut self,
        host: HostAddr,
        count: u64,
        element_size: u64,
        ranged: bool,
    ) -> Result<HostAddr> {
        let size = ByteSize::of_elements(count, element_size).ok_or(Error::InvalidSize)?;
        let key = self.config.shifter.shift(host);
        self.registry.insert(key, host, size, ranged)?;
        Ok(key)
    }

    /// Register the memory behind a slice
    ///
    /// # Safety
    /// Same contract as [`MemoryManager::insert`]: the slice's storage must
    /// outlive its registration, and nothing may hold a borrow of it while
    /// the manager writes into it.
    pub unsafe fn insert_slice<T>(&mut self, slice: &[T]) -> Result<HostAddr> {
        // SAFETY: forwarded from the caller
        unsafe {
            self.insert(
                HostAddr::of_slice(slice),
                slice.len() as u64,
                mem::size_of::<T>() as u64,
                false,
            )
        }
    }

    /// Stop tracking `key`, freeing its device mirror
    ///
    /// Returns the raw host address the record described. If the mirror
    /// cannot be freed the record stays registered.
    pub fn erase(&mut self, key: HostAddr) -> Result<HostAddr> {
        let record = *self.registry.require(key)?;
        self.engine.release(&record)?;
        self.registry.remove(key)?;
        Ok(record.host())
    }

    /// Check whether `key` is tracked, optionally registering it as a
    /// sub-range of an enclosing block
    pub fn known(&mut self, key: HostAddr, insert_if_in_range: bool) -> bool {
        self.registry.known(key, insert_if_in_range)
    }

    /// Base key of the registered block containing `probe`
    pub fn range(&self, probe: HostAddr) -> Option<HostAddr> {
        self.registry.range(probe)
    }

    /// Get the record under `key`
    pub fn record(&self, key: HostAddr) -> Option<&MemoryRecord> {
        self.registry.get(key)
    }

    // =========================================================================
    // Residency
    // =========================================================================

    /// Address a kernel should use for `key`
    ///
    /// With device execution disabled this is the host address itself.
    /// Otherwise the first call for a record allocates its mirror and copies
    /// the host bytes in; later calls return the same address.
    pub fn resolve(&mut self, key: HostAddr) -> Result<DeviceAddr> {
        if !self.engine.is_enabled() {
            if self.config.strict_host_lookup && !self.registry.known(key, true) {
                return Err(Error::UnknownAddress(key));
            }
            return Ok(DeviceAddr::from_host(self.config.shifter.unshift(key)));
        }

        self.engine.ensure_ready()?;
        if !self.registry.known(key, true) {
            return Err(Error::UnknownAddress(key));
        }
        self.engine.materialize(&mut self.registry, key)
    }

    /// Copy a materialized record's host bytes to the device
    pub fn push(&mut self, key: HostAddr) -> Result<()> {
        self.engine.push(&self.registry, key)
    }

    /// Copy a materialized record's device bytes back to the host
    pub fn pull(&mut self, key: HostAddr) -> Result<()> {
        self.engine.pull(&self.registry, key)
    }

    // =========================================================================
    // Raw Copies
    // =========================================================================

    /// Copy `bytes` from host memory to device memory, returning `dest`
    ///
    /// # Safety
    /// `src` must be readable for `bytes` bytes; with device execution
    /// disabled `dest` is a host address and must be writable.
    pub unsafe fn copy_host_to_device(
        &mut self,
        dest: DeviceAddr,
        src: HostAddr,
        bytes: ByteSize,
        flags: CopyFlags,
    ) -> Result<DeviceAddr> {
        // SAFETY: forwarded from the caller
        unsafe { self.engine.copy_h2d(dest, src, bytes, flags) }
    }

    /// Copy `bytes` from device memory to host memory, returning `dest`
    ///
    /// # Safety
    /// `dest` must be writable for `bytes` bytes; with device execution
    /// disabled `src` is a host address and must be readable.
    pub unsafe fn copy_device_to_host(
        &mut self,
        dest: HostAddr,
        src: DeviceAddr,
        bytes: ByteSize,
        flags: CopyFlags,
    ) -> Result<HostAddr> {
        // SAFETY: forwarded from the caller
        unsafe { self.engine.copy_d2h(dest, src, bytes, flags) }
    }

    /// Copy `bytes` between device locations, returning `dest`
    ///
    /// # Safety
    /// With device execution disabled both are host addresses and must be
    /// valid for `bytes` bytes.
    pub unsafe fn copy_device_to_device(
        &mut self,
        dest: DeviceAddr,
        src: DeviceAddr,
        bytes: ByteSize,
        flags: CopyFlags,
    ) -> Result<DeviceAddr> {
        // SAFETY: forwarded from the caller
        unsafe { self.engine.copy_d2d(dest, src, bytes, flags) }
    }

    /// Synchronous device to device copy
    ///
    /// # Safety
    /// See [`MemoryManager::copy_device_to_device`].
    pub unsafe fn memcpy(
        &mut self,
        dest: DeviceAddr,
        src: DeviceAddr,
        bytes: ByteSize,
    ) -> Result<DeviceAddr> {
        // SAFETY: forwarded from the caller
        unsafe { self.copy_device_to_device(dest, src, bytes, CopyFlags::empty()) }
    }

    // =========================================================================
    // Checked Handles
    // =========================================================================

    /// Checked handle to the start of the record under `key`
    pub fn checked(&mut self, key: HostAddr) -> Result<CheckedAddr> {
        if !self.registry.known(key, true) {
            return Err(Error::UnknownAddress(key));
        }
        let record = self.registry.require(key)?;
        Ok(CheckedAddr::new(key, record.id(), record.size().as_bytes()))
    }

    /// Raw host address behind a checked handle
    pub fn validate(&self, handle: &CheckedAddr) -> Result<HostAddr> {
        handle.validate(&self.registry)
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Get statistics
    pub fn stats(&self) -> MemoryStats {
        let registry = self.registry.stats();
        let sync = self.engine.stats();

        MemoryStats {
            registrations: registry.registrations,
            sub_ranges: registry.sub_ranges,
            erasures: registry.erasures,
            materializations: sync.materializations,
            pushes: sync.pushes,
            pulls: sync.pulls,
            releases: sync.releases,
            bytes_to_device: sync.bytes_to_device,
            bytes_to_host: sync.bytes_to_host,
            bytes_on_device: sync.bytes_on_device,
            live_records: self.registry.len(),
            live_bytes: registry.live_bytes,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use tandem_core::{CopyBackend, DeviceContext, StreamHandle};
    use tandem_hal::{HostContext, SimulatedConfig, SimulatedDevice};

    use super::*;
    use crate::registry::Residency;
    use crate::FailFast;

    fn device_manager() -> MemoryManager<SimulatedDevice> {
        MemoryManager::new(SimulatedDevice::default(), ManagerConfig::plain())
    }

    fn host_manager() -> MemoryManager<SimulatedDevice> {
        MemoryManager::new(
            SimulatedDevice::new(SimulatedConfig::disabled()),
            ManagerConfig::plain(),
        )
    }

    fn addr_of<T>(buf: &mut [T]) -> HostAddr {
        HostAddr::from_ptr(buf.as_mut_ptr())
    }

    #[test]
    fn test_end_to_end() {
        let mut data: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let p = addr_of(&mut data);
        let mut mm = device_manager();

        // SAFETY: `data` outlives the registration
        let key = unsafe { mm.insert(p, 100, 8, false) }.unwrap();
        assert_eq!(key, p);
        assert_eq!(mm.record(key).unwrap().size(), ByteSize::from_bytes(800));

        let d = mm.resolve(key).unwrap();
        let stats = mm.device().stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.h2d, 1);
        assert_eq!(stats.bytes_h2d, 800);
        assert_eq!(mm.device().used(), ByteSize::from_bytes(800));

        assert_eq!(mm.resolve(key).unwrap(), d);
        assert_eq!(mm.device().stats().h2d, 1);

        mm.device().write(d, &42.0f64.to_ne_bytes()).unwrap();
        mm.pull(key).unwrap();
        let stats = mm.device().stats();
        assert_eq!(stats.d2h, 1);
        assert_eq!(stats.bytes_d2h, 800);

        assert_eq!(mm.erase(key), Ok(p));
        assert!(!mm.known(key, false));
        assert_eq!(mm.device().live_allocations(), 0);
        assert_eq!(data[0], 42.0);
        assert_eq!(data[99], 99.0);
    }

    #[test]
    fn test_host_mode_resolve_is_identity() {
        let mut data = vec![0u32; 16];
        let p = addr_of(&mut data);
        let mut mm = host_manager();

        // SAFETY: `data` outlives the registration
        let key = unsafe { mm.insert(p, 16, 4, false) }.unwrap();
        assert_eq!(mm.resolve(key).unwrap(), DeviceAddr::from_host(p));
        mm.push(key).unwrap();
        mm.pull(key).unwrap();

        // Unregistered addresses pass straight through.
        let stray = HostAddr::new(0x1234_5678);
        assert_eq!(mm.resolve(stray).unwrap(), DeviceAddr::from_host(stray));

        let stats = mm.device().stats();
        assert_eq!(stats.backend_calls(), 0);
        assert_eq!(stats.setups, 0);
        assert_eq!(mm.record(key).unwrap().residency(), Residency::Host);
    }

    #[test]
    fn test_strict_host_lookup() {
        let mut data = vec![0u8; 8];
        let p = addr_of(&mut data);
        let config = ManagerConfig {
            strict_host_lookup: true,
            ..ManagerConfig::plain()
        };
        let mut mm = MemoryManager::new(HostContext::new(), config);

        let stray = HostAddr::new(0x1234_5678);
        assert_eq!(mm.resolve(stray), Err(Error::UnknownAddress(stray)));

        // SAFETY: `data` outlives the registration
        let key = unsafe { mm.insert(p, 8, 1, false) }.unwrap();
        assert_eq!(mm.resolve(key + 4).unwrap(), DeviceAddr::from_host(p + 4));
        assert!(mm.known(key + 4, false));
    }

    #[test]
    fn test_duplicate_and_unknown() {
        let mut data = vec![0u8; 8];
        let p = addr_of(&mut data);
        let mut mm = device_manager();

        // SAFETY: `data` outlives the registration
        unsafe {
            mm.insert(p, 8, 1, false).unwrap();
            assert_eq!(
                mm.insert(p, 8, 1, false),
                Err(Error::DuplicateRegistration {
                    addr: p,
                    ranged: false
                })
            );
        }

        let unknown = HostAddr::new(0x10);
        assert_eq!(mm.erase(unknown), Err(Error::UnknownAddress(unknown)));
        assert_eq!(mm.push(unknown), Err(Error::UnknownAddress(unknown)));
        assert_eq!(mm.pull(unknown), Err(Error::UnknownAddress(unknown)));
        assert_eq!(mm.resolve(unknown), Err(Error::UnknownAddress(unknown)));
    }

    #[test]
    fn test_size_overflow() {
        let mut mm = device_manager();
        // SAFETY: rejected before anything is recorded
        let result = unsafe { mm.insert(HostAddr::new(0x1000), u64::MAX, 16, false) };
        assert_eq!(result, Err(Error::InvalidSize));
        assert_eq!(mm.stats().live_records, 0);
    }

    #[test]
    fn test_push_depends_on_residency() {
        let mut data = vec![1u8; 64];
        let p = addr_of(&mut data);
        let mut mm = device_manager();
        // SAFETY: `data` outlives the registration
        let key = unsafe { mm.insert(p, 64, 1, false) }.unwrap();

        mm.push(key).unwrap();
        assert_eq!(mm.device().stats().copies(), 0);

        mm.resolve(key).unwrap();
        mm.device().reset_stats();
        mm.push(key).unwrap();
        let stats = mm.device().stats();
        assert_eq!(stats.h2d, 1);
        assert_eq!(stats.bytes_h2d, 64);
        assert_eq!(stats.async_copies, 0);
    }

    #[test]
    fn test_materialization_flavour_follows_config() {
        let mut data = vec![0u8; 32];
        let p = addr_of(&mut data);

        let mut mm = device_manager();
        // SAFETY: `data` outlives the registration
        let key = unsafe { mm.insert(p, 32, 1, false) }.unwrap();
        mm.resolve(key).unwrap();
        assert_eq!(mm.device().stats().async_copies, 1);
        mm.erase(key).unwrap();

        let config = ManagerConfig::from_options("noxs sync");
        let mut mm = MemoryManager::new(SimulatedDevice::default(), config);
        // SAFETY: `data` outlives the registration
        let key = unsafe { mm.insert(p, 32, 1, false) }.unwrap();
        mm.resolve(key).unwrap();
        assert_eq!(mm.device().stats().async_copies, 0);
        assert_eq!(mm.device().stats().h2d, 1);
    }

    #[test]
    fn test_interior_pointer_gets_its_own_mirror() {
        let mut data: Vec<u8> = (0..=255).collect();
        let p = addr_of(&mut data);
        let mut mm = device_manager();
        // SAFETY: `data` outlives the registration
        let key = unsafe { mm.insert(p, 256, 1, false) }.unwrap();

        let probe = key + 100;
        assert_eq!(mm.range(probe), Some(key));
        let d = mm.resolve(probe).unwrap();

        assert_eq!(mm.record(probe).unwrap().size(), ByteSize::from_bytes(156));
        assert_eq!(mm.device().read(d, 2).unwrap(), vec![100, 101]);
        let stats = mm.device().stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.bytes_h2d, 156);
        assert_eq!(mm.record(key).unwrap().residency(), Residency::Host);

        mm.push(key).unwrap();
        assert_eq!(mm.device().stats().h2d, 1);
        assert_eq!(mm.stats().sub_ranges, 1);
        assert_eq!(mm.stats().materializations, 1);
    }

    #[test]
    fn test_sub_range_survives_parent_erase() {
        let mut data = vec![0u8; 64];
        let p = addr_of(&mut data);
        let mut mm = device_manager();
        // SAFETY: `data` outlives the registration
        let key = unsafe { mm.insert(p, 64, 1, false) }.unwrap();
        let d1 = mm.resolve(key + 32).unwrap();
        mm.device().write(d1, &[7; 32]).unwrap();

        assert_eq!(mm.erase(key), Ok(p));
        let sub = mm.record(key + 32).unwrap();
        assert_eq!(sub.residency(), Residency::Device);
        assert!(sub.parent().is_none());

        mm.pull(key + 32).unwrap();
        assert_eq!(mm.device().stats().d2h, 1);
        assert_eq!(mm.resolve(key + 32), Ok(d1));
        assert_eq!(mm.erase(key + 32), Ok(p + 32));
        assert_eq!(mm.device().live_allocations(), 0);
        assert_eq!(&data[32..], &[7; 32]);
        assert_eq!(&data[..32], &[0; 32]);
    }

    /// Simulated device whose frees always fail
    #[derive(Debug, Default)]
    struct StuckFree(SimulatedDevice);

    impl DeviceContext for StuckFree {
        fn setup(&self) -> Result<()> {
            self.0.setup()
        }

        fn is_enabled(&self) -> bool {
            self.0.is_enabled()
        }

        fn stream(&self) -> StreamHandle {
            self.0.stream()
        }
    }

    impl CopyBackend for StuckFree {
        fn allocate(&self, size: ByteSize) -> Result<DeviceAddr> {
            self.0.allocate(size)
        }

        fn free(&self, _addr: DeviceAddr) -> Result<()> {
            Err(Error::NotSupported)
        }

        unsafe fn copy_h2d(
            &self,
            dest: DeviceAddr,
            src: HostAddr,
            bytes: ByteSize,
            stream: Option<StreamHandle>,
        ) -> Result<()> {
            // SAFETY: forwarded from the caller
            unsafe { self.0.copy_h2d(dest, src, bytes, stream) }
        }

        unsafe fn copy_d2h(
            &self,
            dest: HostAddr,
            src: DeviceAddr,
            bytes: ByteSize,
            stream: Option<StreamHandle>,
        ) -> Result<()> {
            // SAFETY: forwarded from the caller
            unsafe { self.0.copy_d2h(dest, src, bytes, stream) }
        }

        fn copy_d2d(
            &self,
            dest: DeviceAddr,
            src: DeviceAddr,
            bytes: ByteSize,
            stream: Option<StreamHandle>,
        ) -> Result<()> {
            self.0.copy_d2d(dest, src, bytes, stream)
        }
    }

    #[test]
    fn test_failed_free_keeps_record() {
        let mut data = vec![1u8; 16];
        let p = addr_of(&mut data);
        let mut mm = MemoryManager::new(StuckFree::default(), ManagerConfig::plain());
        // SAFETY: `data` outlives the registration
        let key = unsafe { mm.insert(p, 16, 1, false) }.unwrap();
        let d = mm.resolve(key).unwrap();

        assert_eq!(mm.erase(key), Err(Error::NotSupported));
        assert!(mm.known(key, false));
        assert_eq!(mm.resolve(key), Ok(d));
        assert_eq!(mm.stats().erasures, 0);
    }

    #[test]
    fn test_device_unavailable() {
        let mut data = vec![0u8; 8];
        let p = addr_of(&mut data);
        let mut mm = MemoryManager::new(
            SimulatedDevice::new(SimulatedConfig::broken()),
            ManagerConfig::plain(),
        );
        // SAFETY: `data` outlives the registration
        let key = unsafe { mm.insert(p, 8, 1, false) }.unwrap();

        assert_eq!(mm.resolve(key), Err(Error::DeviceUnavailable));
        // Setup is checked before the address.
        assert_eq!(mm.resolve(HostAddr::new(0x10)), Err(Error::DeviceUnavailable));
        assert_eq!(mm.record(key).unwrap().residency(), Residency::Host);
    }

    #[test]
    fn test_zero_sized_buffers() {
        let mut data = vec![0u8; 1];
        let p = addr_of(&mut data);
        let mut mm = device_manager();
        // SAFETY: nothing is read through a zero-sized registration
        let key = unsafe { mm.insert(p, 0, 8, false) }.unwrap();

        assert!(mm.known(key, false));
        assert_eq!(mm.record(key).unwrap().size(), ByteSize::ZERO);
        assert!(mm.resolve(key).unwrap().is_null());
        mm.push(key).unwrap();
        mm.pull(key).unwrap();
        mm.erase(key).unwrap();
        assert_eq!(mm.device().stats().backend_calls(), 0);
    }

    #[test]
    fn test_shifted_keys() {
        let mut data: Vec<u8> = (0..64).collect();
        let p = addr_of(&mut data);
        let mut mm = MemoryManager::new(SimulatedDevice::default(), ManagerConfig::shifted());

        // SAFETY: `data` outlives the registration
        let key = unsafe { mm.insert(p, 64, 1, false) }.unwrap();
        assert_ne!(key, p);
        assert_eq!(mm.config().shifter.unshift(key), p);
        assert_eq!(mm.record(key).unwrap().host(), p);
        assert!(!mm.known(p, true));

        let d = mm.resolve(key + 8).unwrap();
        assert_eq!(mm.record(key + 8).unwrap().host(), p + 8);
        assert_eq!(mm.device().read(d, 2).unwrap(), vec![8, 9]);
        assert_eq!(mm.erase(key), Ok(p));
    }

    #[test]
    fn test_shifted_host_mode_unshifts() {
        let mut data = vec![0u8; 8];
        let p = addr_of(&mut data);
        let mut mm = MemoryManager::new(HostContext::new(), ManagerConfig::shifted());
        // SAFETY: `data` outlives the registration
        let key = unsafe { mm.insert(p, 8, 1, false) }.unwrap();
        assert_eq!(mm.resolve(key).unwrap(), DeviceAddr::from_host(p));
    }

    #[test]
    fn test_host_mode_raw_copies() {
        let src = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut dest = [0u8; 8];
        let target = DeviceAddr::from_host(addr_of(&mut dest));
        let mut mm = host_manager();

        // SAFETY: both arrays are live for eight bytes
        let out = unsafe {
            mm.memcpy(
                target,
                DeviceAddr::from_host(HostAddr::of_slice(&src)),
                ByteSize::from_bytes(8),
            )
        };
        assert_eq!(out, Ok(target));
        assert_eq!(dest, src);
        assert_eq!(mm.device().stats().backend_calls(), 0);
    }

    #[test]
    fn test_raw_copies_of_zero_bytes_return_dest() {
        let mut mm = device_manager();
        let dest = DeviceAddr::new(0x40);
        let host = HostAddr::new(0x80);

        // SAFETY: zero-byte copies touch no memory
        unsafe {
            assert_eq!(mm.copy_host_to_device(dest, host, ByteSize::ZERO, CopyFlags::ASYNC), Ok(dest));
            assert_eq!(mm.copy_device_to_host(host, dest, ByteSize::ZERO, CopyFlags::empty()), Ok(host));
            assert_eq!(mm.copy_device_to_device(dest, dest, ByteSize::ZERO, CopyFlags::empty()), Ok(dest));
            assert_eq!(mm.memcpy(dest, dest, ByteSize::ZERO), Ok(dest));
        }
        assert_eq!(mm.device().stats().backend_calls(), 0);
    }

    #[test]
    fn test_memcpy_between_mirrors_is_synchronous() {
        let a: Vec<u8> = vec![9; 16];
        let b: Vec<u8> = vec![0; 16];
        let mut mm = device_manager();
        // SAFETY: both vectors outlive their registrations
        let (ka, kb) = unsafe { (mm.insert_slice(&a).unwrap(), mm.insert_slice(&b).unwrap()) };
        let da = mm.resolve(ka).unwrap();
        let db = mm.resolve(kb).unwrap();
        mm.device().reset_stats();

        // SAFETY: both are live device allocations of sixteen bytes
        unsafe { mm.memcpy(db, da, ByteSize::from_bytes(16)).unwrap() };
        let stats = mm.device().stats();
        assert_eq!(stats.d2d, 1);
        assert_eq!(stats.async_copies, 0);
        assert_eq!(mm.device().read(db, 16).unwrap(), a);
        assert_eq!(mm.stats().bytes_on_device, 16);
    }

    #[test]
    fn test_checked_handles() {
        let mut data = vec![0u8; 32];
        let p = addr_of(&mut data);
        let mut mm = device_manager();
        // SAFETY: `data` outlives the registration
        let key = unsafe { mm.insert(p, 32, 1, false) }.unwrap();

        let handle = mm.checked(key).unwrap().offset(4).unwrap();
        assert_eq!(mm.validate(&handle), Ok(p + 4));
        assert!(handle.offset(29).is_err());

        let inner = mm.checked(key + 16).unwrap();
        assert_eq!(inner.remaining(), 16);

        mm.erase(key).unwrap();
        // SAFETY: `data` outlives the registration
        unsafe { mm.insert(p, 32, 1, false) }.unwrap();
        assert_eq!(mm.validate(&handle), Err(Error::StaleHandle));
        assert_eq!(mm.checked(HostAddr::new(0x10)), Err(Error::UnknownAddress(HostAddr::new(0x10))));
    }

    #[test]
    fn test_stats() {
        let mut a = vec![0u8; 100];
        let mut b = vec![0u8; 50];
        let (pa, pb) = (addr_of(&mut a), addr_of(&mut b));
        let mut mm = device_manager();

        // SAFETY: both vectors outlive their registrations
        unsafe {
            mm.insert(pa, 100, 1, false).unwrap();
            mm.insert(pb, 50, 1, false).unwrap();
        }
        mm.resolve(pa).unwrap();
        mm.push(pa).unwrap();
        mm.pull(pa).unwrap();
        mm.erase(pb).unwrap();

        let stats = mm.stats();
        assert_eq!(stats.registrations, 2);
        assert_eq!(stats.erasures, 1);
        assert_eq!(stats.materializations, 1);
        assert_eq!(stats.pushes, 1);
        assert_eq!(stats.pulls, 1);
        assert_eq!(stats.bytes_to_device, 200);
        assert_eq!(stats.bytes_to_host, 100);
        assert_eq!(stats.live_records, 1);
        assert_eq!(stats.live_bytes, 100);
    }

    #[test]
    fn test_fail_fast_wrapper() {
        let mut data = vec![0u8; 8];
        let p = addr_of(&mut data);
        let mut mm = host_manager();
        // SAFETY: `data` outlives the registration
        let key = unsafe { mm.insert(p, 8, 1, false) }.or_abort();
        assert_eq!(mm.erase(key).or_abort(), p);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_fail_fast_aborts_on_misuse() {
        let mut data = vec![0u8; 8];
        let p = addr_of(&mut data);
        let mut mm = host_manager();
        // SAFETY: `data` outlives the registration
        unsafe {
            mm.insert(p, 8, 1, false).or_abort();
            mm.insert(p, 8, 1, false).or_abort();
        }
    }
}
