//! # Address Registry
//!
//! Single source of truth for what is tracked: registry key → memory record.
//!
//! Keys are host addresses as the caller sees them, already passed through
//! the address shifter; each record also stores the raw host address the
//! copies use. Every block not nested inside another one is mirrored into a
//! [`RangeIndex`] so that pointers into its middle can be resolved.
//!
//! A sub-range is a record of its own: it gets its own device mirror of its
//! own size, and erasing the enclosing block leaves it untouched apart from
//! forgetting its parent.

use hashbrown::HashMap;
use tandem_core::{ByteSize, DeviceAddr, Error, Handle, HostAddr, Result};

use crate::range::RangeIndex;

// =============================================================================
// MEMORY RECORD
// =============================================================================

/// Record ID, unique for the lifetime of a registry
pub type RecordId = Handle<MemoryRecord>;

/// Which side holds the authoritative copy of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    /// Host memory; no device mirror exists yet
    Host,
    /// Device mirror materialized
    Device,
}

bitflags::bitflags! {
    /// Record property flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RecordFlags: u8 {
        /// Registered as a range (explicitly or by interior lookup)
        const SUB_RANGE = 1 << 0;
    }
}

/// A tracked host buffer or sub-range
#[derive(Debug, Clone, Copy)]
pub struct MemoryRecord {
    id: RecordId,
    host: HostAddr,
    size: ByteSize,
    device: DeviceAddr,
    residency: Residency,
    flags: RecordFlags,
    parent: Option<HostAddr>,
}

impl MemoryRecord {
    /// Get record ID
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Raw host address of the first byte
    pub fn host(&self) -> HostAddr {
        self.host
    }

    /// Get size
    pub fn size(&self) -> ByteSize {
        self.size
    }

    /// Device mirror, null until materialized
    pub fn device(&self) -> DeviceAddr {
        self.device
    }

    /// Get authoritative side
    pub fn residency(&self) -> Residency {
        self.residency
    }

    /// Get flags
    pub fn flags(&self) -> RecordFlags {
        self.flags
    }

    /// Key of the enclosing original block
    pub fn parent(&self) -> Option<HostAddr> {
        self.parent
    }

    /// Check if this record was derived from another block
    pub fn is_sub_range(&self) -> bool {
        self.flags.contains(RecordFlags::SUB_RANGE)
    }

    /// Check if a device mirror has been set up
    pub fn is_materialized(&self) -> bool {
        self.residency == Residency::Device
    }

    /// Check if a device allocation backs this record
    pub fn owns_mirror(&self) -> bool {
        self.is_materialized() && !self.device.is_null()
    }

    pub(crate) fn materialize(&mut self, device: DeviceAddr) {
        self.device = device;
        self.residency = Residency::Device;
    }

}

// =============================================================================
// ADDRESS REGISTRY
// =============================================================================

/// Registry statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryStats {
    /// Explicit registrations
    pub registrations: u64,
    /// Sub-ranges registered by range lookup
    pub sub_ranges: u64,
    /// Erased records
    pub erasures: u64,
    /// Bytes covered by live records (sub-ranges counted separately)
    pub live_bytes: u64,
}

/// Key → record map plus the range index over top-level blocks
#[derive(Debug)]
pub struct AddressRegistry {
    /// All tracked records
    records: HashMap<HostAddr, MemoryRecord>,
    /// Extents of top-level blocks
    index: RangeIndex,
    /// Next record ID
    next_id: u64,
    /// Statistics
    stats: RegistryStats,
}

impl Default for AddressRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            index: RangeIndex::new(),
            next_id: 1,
            stats: RegistryStats::default(),
        }
    }

    /// Register `size` bytes of host memory at `host` under `key`
    ///
    /// Re-registering a live key fails whether the existing entry is an
    /// original block or a sub-range. A ranged block inside a registered
    /// block is nested under it; otherwise it is indexed like any other.
    pub fn insert(
        &mut self,
        key: HostAddr,
        host: HostAddr,
        size: ByteSize,
        ranged: bool,
    ) -> Result<RecordId> {
        if let Some(existing) = self.records.get(&key) {
            return Err(Error::DuplicateRegistration {
                addr: key,
                ranged: existing.is_sub_range(),
            });
        }

        let mut flags = RecordFlags::empty();
        let mut parent = None;
        if ranged {
            flags.insert(RecordFlags::SUB_RANGE);
            parent = self.index.enclosing(key);
        }
        if parent.is_none() {
            if self.index.overlaps(key, size) {
                log::warn!("registering {} ({}) over a live block", key, size);
            }
            self.index.insert(key, size);
        }

        let id = self.add(key, host, size, flags, parent);
        self.stats.registrations += 1;
        log::debug!("registered {} ({}){}", key, size, if ranged { " ranged" } else { "" });

        Ok(id)
    }

    fn add(
        &mut self,
        key: HostAddr,
        host: HostAddr,
        size: ByteSize,
        flags: RecordFlags,
        parent: Option<HostAddr>,
    ) -> RecordId {
        let id = RecordId::new(self.next_id);
        self.next_id += 1;

        self.records.insert(key, MemoryRecord {
            id,
            host,
            size,
            device: DeviceAddr::null(),
            residency: Residency::Host,
            flags,
            parent,
        });
        self.stats.live_bytes += size.as_bytes();

        id
    }

    /// Check for an exact registry entry
    pub fn contains(&self, key: HostAddr) -> bool {
        self.records.contains_key(&key)
    }

    /// Check whether `key` is tracked
    ///
    /// With `insert_if_in_range`, an address inside a registered block is
    /// registered as a sub-range running to the end of that block.
    pub fn known(&mut self, key: HostAddr, insert_if_in_range: bool) -> bool {
        if self.records.contains_key(&key) {
            return true;
        }
        if !insert_if_in_range {
            return false;
        }

        let Some(base) = self.range(key) else {
            return false;
        };
        let Some(block) = self.records.get(&base).copied() else {
            return false;
        };

        let offset = key - base;
        let size = block.size.saturating_sub(offset);
        self.add(key, block.host + offset, size, RecordFlags::SUB_RANGE, Some(base));
        self.stats.sub_ranges += 1;
        log::debug!("registered {} as sub-range of {} ({})", key, base, size);

        true
    }

    /// Base key of the registered block containing `probe`
    pub fn range(&self, probe: HostAddr) -> Option<HostAddr> {
        self.index.enclosing(probe)
    }

    /// Get record by key
    pub fn get(&self, key: HostAddr) -> Option<&MemoryRecord> {
        self.records.get(&key)
    }

    pub(crate) fn get_mut(&mut self, key: HostAddr) -> Option<&mut MemoryRecord> {
        self.records.get_mut(&key)
    }

    /// Get record by key, failing on unknown addresses
    pub fn require(&self, key: HostAddr) -> Result<&MemoryRecord> {
        self.records.get(&key).ok_or(Error::UnknownAddress(key))
    }

    /// Remove the record registered under `key`
    ///
    /// Sub-ranges of an erased block stay registered, with their residency
    /// and mirrors intact, but lose their parent.
    pub fn remove(&mut self, key: HostAddr) -> Result<MemoryRecord> {
        let record = self.records.remove(&key).ok_or(Error::UnknownAddress(key))?;

        if self.index.remove(key).is_some() {
            let mut detached = 0usize;
            for child in self.records.values_mut().filter(|r| r.parent == Some(key)) {
                child.parent = None;
                detached += 1;
            }
            if detached > 0 {
                log::debug!("erasing {} left {} sub-range(s) without parent", key, detached);
            }
        }

        self.stats.erasures += 1;
        self.stats.live_bytes -= record.size.as_bytes();
        log::debug!("erased {} ({})", key, record.size);

        Ok(record)
    }

    /// Get statistics
    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over `(key, record)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&HostAddr, &MemoryRecord)> {
        self.records.iter()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: HostAddr = HostAddr::new(0x10_0000);

    fn registry_with(base: HostAddr, size: u64) -> AddressRegistry {
        let mut registry = AddressRegistry::new();
        registry
            .insert(base, base, ByteSize::from_bytes(size), false)
            .unwrap();
        registry
    }

    #[test]
    fn test_insert_then_known() {
        let registry = registry_with(BASE, 800);
        assert!(registry.contains(BASE));
        assert_eq!(registry.get(BASE).unwrap().size(), ByteSize::from_bytes(800));
        assert_eq!(registry.get(BASE).unwrap().residency(), Residency::Host);
        assert!(registry.get(BASE).unwrap().device().is_null());
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = registry_with(BASE, 16);
        assert_eq!(
            registry.insert(BASE, BASE, ByteSize::from_bytes(16), false),
            Err(Error::DuplicateRegistration {
                addr: BASE,
                ranged: false
            })
        );
    }

    #[test]
    fn test_ranged_reregistration_is_refused() {
        let mut registry = registry_with(BASE, 64);
        assert!(registry.known(BASE + 8, true));
        assert_eq!(
            registry.insert(BASE + 8, BASE + 8, ByteSize::from_bytes(8), false),
            Err(Error::DuplicateRegistration {
                addr: BASE + 8,
                ranged: true
            })
        );
    }

    #[test]
    fn test_zero_sized_registration() {
        let mut registry = registry_with(BASE, 0);
        assert!(registry.known(BASE, false));
        assert_eq!(registry.get(BASE).unwrap().size(), ByteSize::ZERO);
        assert!(registry.range(BASE).is_none());
        assert!(!registry.known(BASE + 1, true));
    }

    #[test]
    fn test_known_without_insertion() {
        let mut registry = registry_with(BASE, 64);
        assert!(!registry.known(BASE + 8, false));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_sub_range_for_every_offset() {
        let n = 32u64;
        for k in 0..n {
            let mut registry = registry_with(BASE, n);
            let probe = BASE + k;
            assert_eq!(registry.range(probe), Some(BASE));
            assert!(registry.known(probe, true));

            let record = registry.get(probe).unwrap();
            assert_eq!(record.size(), ByteSize::from_bytes(n - k));
            assert_eq!(record.host(), probe);
            if k > 0 {
                assert!(record.is_sub_range());
                assert_eq!(record.parent(), Some(BASE));
            }
        }
    }

    #[test]
    fn test_sub_range_of_sub_range_resolves_to_original() {
        let mut registry = registry_with(BASE, 100);
        assert!(registry.known(BASE + 10, true));
        assert!(registry.known(BASE + 30, true));

        let record = registry.get(BASE + 30).unwrap();
        assert_eq!(record.parent(), Some(BASE));
        assert_eq!(record.size(), ByteSize::from_bytes(70));
        assert_eq!(registry.range(BASE + 30), Some(BASE));
        assert_eq!(registry.stats().sub_ranges, 2);
    }

    #[test]
    fn test_outside_any_block() {
        let mut registry = registry_with(BASE, 100);
        assert!(!registry.known(BASE + 100, true));
        assert_eq!(registry.range(BASE + 100), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_raw_host_follows_key_offset() {
        let key = HostAddr::new(0x1_0000_0010_0000);
        let host = HostAddr::new(0x10_0000);
        let mut registry = AddressRegistry::new();
        registry
            .insert(key, host, ByteSize::from_bytes(64), false)
            .unwrap();
        assert!(registry.known(key + 16, true));
        assert_eq!(registry.get(key + 16).unwrap().host(), host + 16);
    }

    #[test]
    fn test_remove() {
        let mut registry = registry_with(BASE, 64);
        let record = registry.remove(BASE).unwrap();
        assert_eq!(record.size(), ByteSize::from_bytes(64));
        assert!(!registry.known(BASE, false));
        assert!(registry.range(BASE + 1).is_none());
        assert_eq!(registry.remove(BASE).unwrap_err(), Error::UnknownAddress(BASE));
        assert_eq!(registry.stats().live_bytes, 0);
    }

    #[test]
    fn test_remove_keeps_sub_range_state() {
        let mut registry = registry_with(BASE, 64);
        assert!(registry.known(BASE + 8, true));
        assert!(registry.known(BASE + 16, true));
        registry.get_mut(BASE).unwrap().materialize(DeviceAddr::new(0x9000));
        registry.get_mut(BASE + 8).unwrap().materialize(DeviceAddr::new(0xa000));

        registry.remove(BASE).unwrap();

        let sub = registry.get(BASE + 8).unwrap();
        assert_eq!(sub.residency(), Residency::Device);
        assert_eq!(sub.device(), DeviceAddr::new(0xa000));
        assert_eq!(sub.parent(), None);
        assert!(sub.is_sub_range());
        assert_eq!(registry.get(BASE + 16).unwrap().parent(), None);
        assert_eq!(registry.get(BASE + 16).unwrap().residency(), Residency::Host);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut registry = registry_with(BASE, 8);
        let first = registry.get(BASE).unwrap().id();
        registry.remove(BASE).unwrap();
        let second = registry
            .insert(BASE, BASE, ByteSize::from_bytes(8), false)
            .unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_explicit_ranged_insert_finds_parent() {
        let mut registry = registry_with(BASE, 64);
        registry
            .insert(BASE + 32, BASE + 32, ByteSize::from_bytes(32), true)
            .unwrap();
        let record = registry.get(BASE + 32).unwrap();
        assert!(record.is_sub_range());
        assert_eq!(record.parent(), Some(BASE));
        // Nested ranges never enter the range index.
        assert_eq!(registry.range(BASE + 40), Some(BASE));
    }

    #[test]
    fn test_ranged_insert_without_parent_is_indexed() {
        let mut registry = AddressRegistry::new();
        registry
            .insert(BASE, BASE, ByteSize::from_bytes(64), true)
            .unwrap();

        assert_eq!(registry.range(BASE + 8), Some(BASE));
        assert!(registry.known(BASE + 8, true));
        let record = registry.get(BASE + 8).unwrap();
        assert_eq!(record.size(), ByteSize::from_bytes(56));
        assert_eq!(record.parent(), Some(BASE));

        registry.remove(BASE).unwrap();
        assert_eq!(registry.range(BASE + 8), None);
        assert_eq!(registry.get(BASE + 8).unwrap().parent(), None);
    }
}
