//! Tenant key scoping.
//!
//! Application keys are packed as a one-element tuple (byte string) under
//! the bound namespace's prefix. The tuple framing escapes embedded NUL
//! bytes and preserves ordering, so a scan over `[pack(begin), pack(end))`
//! returns exactly the application keys `begin <= k < end`, in order.

use crate::store::{Element, KeyRange, StoreError, Subspace};

/// Maps application keys to store keys within one namespace.
#[derive(Debug, Clone, Copy)]
pub struct RangeKeyCodec<'a> {
    subspace: &'a Subspace,
}

impl<'a> RangeKeyCodec<'a> {
    /// Codec scoped to `subspace`.
    pub fn new(subspace: &'a Subspace) -> Self {
        Self { subspace }
    }

    /// Store key for an application key.
    pub fn pack_key(&self, key: &[u8]) -> Vec<u8> {
        self.subspace.pack(&[Element::from(key)])
    }

    /// Store range for an application range. Bounds are packed
    /// independently; an inverted range is empty.
    pub fn pack_range(&self, begin: &[u8], end: &[u8]) -> KeyRange {
        KeyRange::new(self.pack_key(begin), self.pack_key(end))
    }

    /// Recover the application key from a store key.
    pub fn decode_key(&self, key: &[u8]) -> Result<Vec<u8>, StoreError> {
        let mut elements = self.subspace.unpack(key)?;
        match (elements.len(), elements.pop()) {
            (1, Some(Element::Bytes(raw))) => Ok(raw),
            _ => Err(StoreError::UnexpectedKey { key: printable(key) }),
        }
    }
}

/// Render bytes for logs: printable ASCII as-is, `\` doubled, others `\xNN`.
pub fn printable(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &b in data {
        match b {
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out
}
