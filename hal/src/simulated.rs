//! # Simulated Device
//!
//! A device whose memory is an arena of host allocations addressed through
//! a private device address range. Copies are performed immediately, even
//! when queued on a stream, and every backend call is counted.
//!
//! ```text
//!   base                                            base + capacity
//!    │                                                      │
//!    ▼                                                      ▼
//!    ┌──────────┬────┬──────────────┬─────────────────────────┐
//!    │ block #1 │pad │   block #2   │        untouched        │
//!    └──────────┴────┴──────────────┴─────────────────────────┘
//!                                   ▲
//!                                 next
//! ```
//!
//! Addresses are handed out by a bump pointer and never reused, so a
//! dangling device address is always reported instead of aliasing a newer
//! allocation.

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;
use tandem_core::{
    ByteSize, CopyBackend, DeviceAddr, DeviceContext, Error, HostAddr, Result, StreamHandle,
};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Simulated device configuration
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Device execution enabled
    pub enabled: bool,
    /// Make `setup` fail (backend initialization error)
    pub fail_setup: bool,
    /// Total device memory
    pub capacity: ByteSize,
    /// First device address handed out
    pub base: DeviceAddr,
    /// Allocation alignment (power of two)
    pub alignment: u64,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fail_setup: false,
            capacity: ByteSize::from_bytes(256 * 1024 * 1024),
            base: DeviceAddr::new(0x0000_7a00_0000_0000),
            alignment: 256,
        }
    }
}

impl SimulatedConfig {
    /// Configuration with device execution turned off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Configuration whose backend never comes up
    pub fn broken() -> Self {
        Self {
            fail_setup: true,
            ..Default::default()
        }
    }

    /// Configuration with a custom capacity
    pub fn with_capacity(capacity: ByteSize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Backend call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Successful `setup` calls
    pub setups: u64,
    /// Device allocations
    pub allocations: u64,
    /// Device frees
    pub frees: u64,
    /// Host to device copies
    pub h2d: u64,
    /// Device to host copies
    pub d2h: u64,
    /// Device to device copies
    pub d2d: u64,
    /// Copies queued on a stream
    pub async_copies: u64,
    /// Bytes moved host to device
    pub bytes_h2d: u64,
    /// Bytes moved device to host
    pub bytes_d2h: u64,
    /// Bytes moved device to device
    pub bytes_d2d: u64,
}

impl TransferStats {
    /// Total copy calls in any direction
    pub fn copies(&self) -> u64 {
        self.h2d + self.d2h + self.d2d
    }

    /// Total backend calls except `setup`
    pub fn backend_calls(&self) -> u64 {
        self.allocations + self.frees + self.copies()
    }
}

// =============================================================================
// ARENA
// =============================================================================

#[derive(Debug)]
struct Arena {
    /// Next unused device address
    next: u64,
    /// Bytes held by live blocks
    used: u64,
    /// Live blocks by base address
    blocks: BTreeMap<u64, Vec<u8>>,
}

impl Arena {
    /// Find the block holding `[addr, addr + len)`, returning its base
    fn locate(&self, addr: DeviceAddr, len: u64) -> Result<(u64, usize)> {
        let (&base, block) = self
            .blocks
            .range(..=addr.raw())
            .next_back()
            .ok_or(Error::InvalidDeviceAddress(addr))?;

        let offset = addr.raw() - base;
        if offset + len > block.len() as u64 {
            return Err(Error::InvalidDeviceAddress(addr));
        }

        Ok((base, offset as usize))
    }

    fn slice(&self, addr: DeviceAddr, len: u64) -> Result<&[u8]> {
        let (base, offset) = self.locate(addr, len)?;
        Ok(&self.blocks[&base][offset..offset + len as usize])
    }

    fn slice_mut(&mut self, addr: DeviceAddr, len: u64) -> Result<&mut [u8]> {
        let (base, offset) = self.locate(addr, len)?;
        let block = self
            .blocks
            .get_mut(&base)
            .ok_or(Error::InvalidDeviceAddress(addr))?;
        Ok(&mut block[offset..offset + len as usize])
    }
}

#[derive(Debug)]
struct State {
    ready: bool,
    arena: Arena,
    stats: TransferStats,
}

// =============================================================================
// SIMULATED DEVICE
// =============================================================================

/// Arena-backed device
#[derive(Debug)]
pub struct SimulatedDevice {
    config: SimulatedConfig,
    state: Mutex<State>,
}

impl SimulatedDevice {
    /// Create a simulated device
    pub fn new(config: SimulatedConfig) -> Self {
        let next = config.base.raw();
        Self {
            config,
            state: Mutex::new(State {
                ready: false,
                arena: Arena {
                    next,
                    used: 0,
                    blocks: BTreeMap::new(),
                },
                stats: TransferStats::default(),
            }),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &SimulatedConfig {
        &self.config
    }

    /// Snapshot of the call counters
    pub fn stats(&self) -> TransferStats {
        self.state.lock().stats
    }

    /// Reset the call counters
    pub fn reset_stats(&self) {
        self.state.lock().stats = TransferStats::default();
    }

    /// Check whether `setup` has succeeded
    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    /// Number of live device allocations
    pub fn live_allocations(&self) -> usize {
        self.state.lock().arena.blocks.len()
    }

    /// Device bytes held by live allocations
    pub fn used(&self) -> ByteSize {
        ByteSize::from_bytes(self.state.lock().arena.used)
    }

    /// Read device memory, as a kernel would see it
    pub fn read(&self, addr: DeviceAddr, len: usize) -> Result<Vec<u8>> {
        let state = self.state.lock();
        Ok(state.arena.slice(addr, len as u64)?.to_vec())
    }

    /// Overwrite device memory, standing in for a kernel's stores
    pub fn write(&self, addr: DeviceAddr, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        state
            .arena
            .slice_mut(addr, data.len() as u64)?
            .copy_from_slice(data);
        Ok(())
    }

    fn count_copy(stats: &mut TransferStats, stream: Option<StreamHandle>) {
        if stream.is_some() {
            stats.async_copies += 1;
        }
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new(SimulatedConfig::default())
    }
}

impl DeviceContext for SimulatedDevice {
    fn setup(&self) -> Result<()> {
        if self.config.fail_setup {
            log::warn!("simulated device: setup refused by configuration");
            return Err(Error::DeviceUnavailable);
        }

        let mut state = self.state.lock();
        if !state.ready {
            log::debug!(
                "simulated device: up, {} at {}",
                self.config.capacity,
                self.config.base
            );
            state.ready = true;
        }
        state.stats.setups += 1;
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn stream(&self) -> StreamHandle {
        StreamHandle::new(1)
    }
}

impl CopyBackend for SimulatedDevice {
    fn allocate(&self, size: ByteSize) -> Result<DeviceAddr> {
        let mut state = self.state.lock();
        if !state.ready {
            return Err(Error::DeviceUnavailable);
        }
        if size.is_zero() {
            return Err(Error::AllocationFailed);
        }

        let bytes = size.as_bytes();
        if state.arena.used + bytes > self.config.capacity.as_bytes() {
            return Err(Error::OutOfDeviceMemory);
        }

        let addr = DeviceAddr::new(state.arena.next).align_up(self.config.alignment);
        state.arena.next = addr.raw() + bytes;
        state.arena.used += bytes;
        state.arena.blocks.insert(addr.raw(), vec![0u8; size.as_usize()]);
        state.stats.allocations += 1;

        log::trace!("simulated device: alloc {} at {}", size, addr);
        Ok(addr)
    }

    fn free(&self, addr: DeviceAddr) -> Result<()> {
        let mut state = self.state.lock();
        let block = state
            .arena
            .blocks
            .remove(&addr.raw())
            .ok_or(Error::InvalidDeviceAddress(addr))?;
        state.arena.used -= block.len() as u64;
        state.stats.frees += 1;
        Ok(())
    }

    unsafe fn copy_h2d(
        &self,
        dest: DeviceAddr,
        src: HostAddr,
        bytes: ByteSize,
        stream: Option<StreamHandle>,
    ) -> Result<()> {
        // SAFETY: caller guarantees `src` is readable for `bytes`
        let host = unsafe { core::slice::from_raw_parts(src.as_ptr::<u8>(), bytes.as_usize()) };

        let mut state = self.state.lock();
        state
            .arena
            .slice_mut(dest, bytes.as_bytes())?
            .copy_from_slice(host);
        state.stats.h2d += 1;
        state.stats.bytes_h2d += bytes.as_bytes();
        Self::count_copy(&mut state.stats, stream);
        Ok(())
    }

    unsafe fn copy_d2h(
        &self,
        dest: HostAddr,
        src: DeviceAddr,
        bytes: ByteSize,
        stream: Option<StreamHandle>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let device = state.arena.slice(src, bytes.as_bytes())?;

        // SAFETY: caller guarantees `dest` is writable for `bytes`
        let host =
            unsafe { core::slice::from_raw_parts_mut(dest.as_mut_ptr::<u8>(), bytes.as_usize()) };
        host.copy_from_slice(device);

        state.stats.d2h += 1;
        state.stats.bytes_d2h += bytes.as_bytes();
        Self::count_copy(&mut state.stats, stream);
        Ok(())
    }

    fn copy_d2d(
        &self,
        dest: DeviceAddr,
        src: DeviceAddr,
        bytes: ByteSize,
        stream: Option<StreamHandle>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let staged = state.arena.slice(src, bytes.as_bytes())?.to_vec();
        state
            .arena
            .slice_mut(dest, bytes.as_bytes())?
            .copy_from_slice(&staged);

        state.stats.d2d += 1;
        state.stats.bytes_d2d += bytes.as_bytes();
        Self::count_copy(&mut state.stats, stream);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
