//! # Checked Addresses
//!
//! Bounds- and staleness-checked handles into tracked buffers.
//!
//! A [`CheckedAddr`] remembers the record it was taken from. Validating it
//! against the registry catches two kinds of misuse the raw address API
//! cannot: walking off the end of a buffer, and holding on to an address
//! after its buffer was erased and the address registered again.

use tandem_core::{Error, HostAddr, Result};

use crate::registry::{AddressRegistry, RecordId};

/// Handle to a byte inside a tracked record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckedAddr {
    key: HostAddr,
    id: RecordId,
    offset: u64,
    len: u64,
}

impl CheckedAddr {
    pub(crate) fn new(key: HostAddr, id: RecordId, len: u64) -> Self {
        Self {
            key,
            id,
            offset: 0,
            len,
        }
    }

    /// Registry key of the record
    pub fn key(&self) -> HostAddr {
        self.key
    }

    /// ID of the record at the time the handle was taken
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Byte offset from the start of the record
    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Bytes from this position to the end of the record
    pub fn remaining(&self) -> u64 {
        self.len - self.offset
    }

    /// Advance by `bytes`
    ///
    /// The one-past-the-end position is allowed, as for slices.
    pub fn offset(self, bytes: u64) -> Result<Self> {
        let offset = self.offset.checked_add(bytes).ok_or(Error::OutOfBounds)?;
        if offset > self.len {
            return Err(Error::OutOfBounds);
        }
        Ok(Self { offset, ..self })
    }

    /// Raw host address of this position, if the record is still live
    pub fn validate(&self, registry: &AddressRegistry) -> Result<HostAddr> {
        let record = registry.get(self.key).ok_or(Error::StaleHandle)?;
        if record.id() != self.id {
            return Err(Error::StaleHandle);
        }
        if self.offset > record.size().as_bytes() {
            return Err(Error::OutOfBounds);
        }
        Ok(record.host() + self.offset)
    }
}
