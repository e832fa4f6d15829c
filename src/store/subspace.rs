//! Key prefixes.

use super::tuple::{self, Element, TupleError};
use super::KeyRange;

/// A key prefix under which tuples are packed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Subspace {
    prefix: Vec<u8>,
}

impl Subspace {
    /// Subspace rooted at a raw prefix.
    pub fn from_bytes(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Subspace rooted at an encoded tuple.
    pub fn from_tuple(elements: &[Element]) -> Self {
        Self::from_bytes(tuple::pack(elements))
    }

    /// Raw prefix bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.prefix
    }

    /// Nested subspace.
    pub fn subspace(&self, elements: &[Element]) -> Subspace {
        Self::from_bytes(self.pack(elements))
    }

    /// Prefix ++ encoded tuple.
    pub fn pack(&self, elements: &[Element]) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + 16);
        key.extend_from_slice(&self.prefix);
        tuple::pack_into(elements, &mut key);
        key
    }

    /// Strip the prefix and decode the remainder.
    pub fn unpack(&self, key: &[u8]) -> Result<Vec<Element>, TupleError> {
        let rest = key
            .strip_prefix(self.prefix.as_slice())
            .ok_or(TupleError::Truncated { offset: 0 })?;
        tuple::unpack(rest)
    }

    /// Whether `key` lies under this prefix.
    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.prefix)
    }

    /// Range covering every tuple packed in this subspace.
    pub fn range(&self) -> KeyRange {
        let mut begin = self.prefix.clone();
        begin.push(0x00);
        let mut end = self.prefix.clone();
        end.push(0xFF);
        KeyRange::new(begin, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_prepends_prefix() {
        let space = Subspace::from_bytes(b"\x15\x01".to_vec());
        let key = space.pack(&[Element::from(b"foo".as_slice())]);
        assert_eq!(key, b"\x15\x01\x01foo\x00");
        assert!(space.contains(&key));
        assert_eq!(space.unpack(&key).unwrap(), vec![Element::Bytes(b"foo".to_vec())]);
    }

    #[test]
    fn test_unpack_foreign_key_fails() {
        let space = Subspace::from_bytes(b"\x15\x01".to_vec());
        assert!(space.unpack(b"\x15\x02\x01foo\x00").is_err());
    }

    #[test]
    fn test_range_covers_packed_keys() {
        let space = Subspace::from_tuple(&[Element::Int(7)]);
        let range = space.range();
        assert!(range.contains(&space.pack(&[Element::from(b"".as_slice())])));
        assert!(range.contains(&space.pack(&[Element::from(b"\xff\xff".as_slice())])));
        assert!(!range.contains(space.bytes()));
    }

    #[test]
    fn test_nested_subspace() {
        let root = Subspace::from_bytes(b"\xfe".to_vec());
        let nested = root.subspace(&[Element::from("path")]);
        assert!(root.contains(nested.bytes()));
        assert_eq!(nested.bytes(), b"\xfe\x02path\x00");
    }
}
