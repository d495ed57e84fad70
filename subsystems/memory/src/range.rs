//! # Range Resolver
//!
//! Point-in-interval lookup over registered blocks, for pointers into the
//! middle of a buffer.
//!
//! Blocks are kept sorted by base address. A probe walks down from the
//! nearest base at or below it and stops as soon as no block could reach
//! that far: the walk is bounded by the widest block ever indexed, so
//! disjoint blocks cost a single step.

use alloc::collections::BTreeMap;

use tandem_core::{ByteSize, HostAddr};

/// Sorted index of block extents
#[derive(Debug, Default)]
pub struct RangeIndex {
    /// Block sizes by base address
    blocks: BTreeMap<HostAddr, ByteSize>,
    /// Upper bound on any indexed block size
    widest: u64,
}

impl RangeIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self {
            blocks: BTreeMap::new(),
            widest: 0,
        }
    }

    /// Index the block `[base, base + size)`
    ///
    /// Empty blocks contain no address and are not indexed.
    pub fn insert(&mut self, base: HostAddr, size: ByteSize) {
        if size.is_zero() {
            return;
        }
        self.widest = self.widest.max(size.as_bytes());
        self.blocks.insert(base, size);
    }

    /// Drop the block starting at `base`
    pub fn remove(&mut self, base: HostAddr) -> Option<ByteSize> {
        self.blocks.remove(&base)
    }

    /// Base of the block whose extent contains `probe`
    ///
    /// When blocks overlap, the one with the nearest base at or below
    /// `probe` wins.
    pub fn enclosing(&self, probe: HostAddr) -> Option<HostAddr> {
        for (&base, &size) in self.blocks.range(..=probe).rev() {
            let offset = probe - base;
            if offset < size.as_bytes() {
                return Some(base);
            }
            if offset >= self.widest {
                break;
            }
        }
        None
    }

    /// Size of the block starting at `base`
    pub fn get(&self, base: HostAddr) -> Option<ByteSize> {
        self.blocks.get(&base).copied()
    }

    /// Check whether `[base, base + size)` intersects an indexed block
    pub fn overlaps(&self, base: HostAddr, size: ByteSize) -> bool {
        if size.is_zero() {
            return false;
        }
        if self.enclosing(base).is_some() {
            return true;
        }
        match base.raw().checked_add(size.as_usize()) {
            Some(end) => self.blocks.range(base..HostAddr::new(end)).next().is_some(),
            None => self.blocks.range(base..).next().is_some(),
        }
    }

    /// Number of indexed blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
