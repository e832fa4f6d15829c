//! Ordered transactional key-value store seam.
//!
//! The gateway never talks to storage directly. Everything goes through the
//! [`Database`] and [`Transaction`] traits defined here, which model an
//! ordered, optimistically concurrent store:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Database::create_transaction()                          │
//! │    ↓                                                     │
//! │  Transaction (snapshot at read version)                  │
//! │    ├── get / get_range      (reads, conflict-tracked)    │
//! │    ├── set / clear / clear_range (buffered writes)       │
//! │    └── commit → committed version | NotCommitted         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! On top of the raw byte API sit the [`tuple`] encoding, [`subspace`]
//! prefixes and the [`directory`] layer that maps human readable names to
//! allocated prefixes. [`memory`] provides the in-process engine.

pub mod directory;
pub mod memory;
pub mod subspace;
pub mod tuple;

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

pub use directory::{DirectoryLayer, DirectorySubspace};
pub use memory::MemoryDatabase;
pub use subspace::Subspace;
pub use tuple::{Element, TupleError};

/// Errors reported by the store.
///
/// Messages are surfaced verbatim to gateway clients, so they are kept
/// stable and close to what operators of ordered KV stores expect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic conflict detected at commit.
    #[error("Transaction not committed due to conflict with another transaction")]
    NotCommitted,

    /// The read version fell outside the retained commit history.
    #[error("Transaction is too old to perform reads or be committed")]
    TransactionTooOld,

    /// The transaction was cancelled before the operation ran.
    #[error("Operation aborted because the transaction was cancelled")]
    TransactionCancelled,

    /// The transaction already committed.
    #[error("Transaction has already been committed")]
    AlreadyCommitted,

    /// Committed version requested before a successful commit.
    #[error("Transaction has not been committed")]
    NotYetCommitted,

    /// Directory exists but was created by a different layer.
    #[error("directory was created with an incompatible layer: expected '{expected}', found '{found}'")]
    IncompatibleLayer { expected: String, found: String },

    /// Directory path is empty or contains an empty segment.
    #[error("invalid directory path: {reason}")]
    InvalidDirectory { reason: String },

    /// Stored key or value could not be decoded.
    #[error("malformed tuple: {0}")]
    Tuple(#[from] TupleError),

    /// Key does not have the layout its namespace expects.
    #[error("unexpected key layout: {key}")]
    UnexpectedKey { key: String },

    /// Backend failure (network, storage, ...).
    #[error("store unavailable: {message}")]
    Unavailable { message: String },
}

impl StoreError {
    /// Numeric error code in the conventional ordered-KV numbering.
    pub fn code(&self) -> u32 {
        match self {
            Self::NotCommitted => 1020,
            Self::TransactionTooOld => 1007,
            Self::TransactionCancelled => 1025,
            Self::AlreadyCommitted => 2017,
            Self::NotYetCommitted => 2018,
            Self::IncompatibleLayer { .. } => 2102,
            Self::InvalidDirectory { .. } => 2100,
            Self::Tuple(_) | Self::UnexpectedKey { .. } => 2101,
            Self::Unavailable { .. } => 1500,
        }
    }

    /// Whether a fresh transaction could succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotCommitted | Self::TransactionTooOld)
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed future returned by asynchronous store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Iterator over the results of a range read.
///
/// Each step may fail; callers decide whether partial results are usable.
pub type RangeIter<'a> = Box<dyn Iterator<Item = StoreResult<KeyValue>> + Send + 'a>;

/// Half-open key interval `[begin, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyRange {
    /// Inclusive lower bound.
    pub begin: Vec<u8>,
    /// Exclusive upper bound.
    pub end: Vec<u8>,
}

impl KeyRange {
    /// Create a range from its bounds.
    pub fn new(begin: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            begin: begin.into(),
            end: end.into(),
        }
    }

    /// Range containing exactly one key.
    pub fn single(key: &[u8]) -> Self {
        let mut end = Vec::with_capacity(key.len() + 1);
        end.extend_from_slice(key);
        end.push(0x00);
        Self::new(key.to_vec(), end)
    }

    /// Whether the range contains no keys.
    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }

    /// Whether `key` falls inside the range.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.begin.as_slice() <= key && key < self.end.as_slice()
    }

    /// Whether two ranges share at least one key.
    pub fn intersects(&self, other: &KeyRange) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.begin < other.end
            && other.begin < self.end
    }
}

/// A key/value pair returned by a range read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// Store key (fully qualified, prefix included).
    pub key: Bytes,
    /// Stored value.
    pub value: Bytes,
}

impl KeyValue {
    /// Create a pair.
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Handle to an ordered transactional store.
pub trait Database: Send + Sync {
    /// Open a new transaction reading from the latest committed snapshot.
    fn create_transaction(&self) -> StoreResult<Box<dyn Transaction>>;
}

/// A single store transaction.
///
/// Writes are buffered until [`Transaction::commit`]. Dropping a transaction
/// without committing abandons it.
pub trait Transaction: Send {
    /// Version of the snapshot this transaction reads from.
    fn read_version(&mut self) -> StoreFuture<'_, i64>;

    /// Read a single key.
    fn get<'a>(&'a mut self, key: &'a [u8]) -> StoreFuture<'a, Option<Bytes>>;

    /// Read all keys in `range`, in ascending key order.
    fn get_range(&mut self, range: KeyRange) -> RangeIter<'_>;

    /// Buffer a write.
    fn set(&mut self, key: &[u8], value: &[u8]);

    /// Buffer the removal of a key.
    fn clear(&mut self, key: &[u8]);

    /// Buffer the removal of every key in `range`.
    fn clear_range(&mut self, range: KeyRange);

    /// Attempt to commit buffered writes.
    fn commit(&mut self) -> StoreFuture<'_, ()>;

    /// Version at which the transaction committed.
    ///
    /// Read-only transactions report `-1`.
    fn committed_version(&self) -> StoreResult<i64>;

    /// Cancel the transaction. Later operations fail.
    fn cancel(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_range_contains() {
        let range = KeyRange::new(b"b".to_vec(), b"d".to_vec());
        assert!(!range.contains(b"a"));
        assert!(range.contains(b"b"));
        assert!(range.contains(b"c\xff"));
        assert!(!range.contains(b"d"));
    }

    #[test]
    fn test_key_range_single() {
        let range = KeyRange::single(b"foo");
        assert!(range.contains(b"foo"));
        assert!(!range.contains(b"foo\x00"));
        assert!(!range.contains(b"fo"));
    }

    #[test]
    fn test_key_range_intersects() {
        let ab = KeyRange::new(b"a".to_vec(), b"b".to_vec());
        let bc = KeyRange::new(b"b".to_vec(), b"c".to_vec());
        let ac = KeyRange::new(b"a".to_vec(), b"c".to_vec());
        let empty = KeyRange::new(b"z".to_vec(), b"a".to_vec());

        assert!(!ab.intersects(&bc));
        assert!(ab.intersects(&ac));
        assert!(bc.intersects(&ac));
        assert!(!empty.intersects(&ac));
        assert!(empty.is_empty());
    }

    #[test]
    fn test_store_error_codes() {
        assert_eq!(StoreError::NotCommitted.code(), 1020);
        assert!(StoreError::NotCommitted.is_retryable());
        assert!(!StoreError::TransactionCancelled.is_retryable());
        assert!(StoreError::NotCommitted
            .to_string()
            .contains("conflict with another transaction"));
    }
}
