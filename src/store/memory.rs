//! In-process MVCC store engine.
//!
//! Keeps every key's version history in an ordered map and validates
//! transactions optimistically: a commit fails with
//! [`StoreError::NotCommitted`] when any key or range it read was written by
//! a transaction that committed after its read version.
//!
//! History is bounded. Once more than `max_history` write commits are
//! retained, the oldest commit record is dropped, the servable floor moves
//! forward and superseded versions of the keys it touched are compacted.
//! Transactions reading below the floor fail with
//! [`StoreError::TransactionTooOld`].

use super::{
    Database, KeyRange, KeyValue, RangeIter, StoreError, StoreFuture, StoreResult, Transaction,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Default number of write commits retained for conflict checks.
pub const DEFAULT_MAX_HISTORY: usize = 100_000;

/// Shared in-memory database handle.
#[derive(Clone)]
pub struct MemoryDatabase {
    engine: Arc<Mutex<Engine>>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::with_max_history(DEFAULT_MAX_HISTORY)
    }

    /// Create an empty database retaining at most `max_history` commits.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            engine: Arc::new(Mutex::new(Engine::new(max_history.max(1)))),
        }
    }

    /// Latest committed version.
    pub fn current_version(&self) -> i64 {
        self.engine.lock().version
    }

    /// Number of live keys at the latest version.
    pub fn key_count(&self) -> usize {
        let engine = self.engine.lock();
        let version = engine.version;
        engine
            .data
            .values()
            .filter(|history| value_at(history, version).is_some())
            .count()
    }
}

impl Database for MemoryDatabase {
    fn create_transaction(&self) -> StoreResult<Box<dyn Transaction>> {
        let read_version = self.engine.lock().version;
        Ok(Box::new(MemoryTransaction::new(
            Arc::clone(&self.engine),
            read_version,
        )))
    }
}

/// Versioned values of one key, ascending by version. `None` is a tombstone.
type History = Vec<(i64, Option<Bytes>)>;

/// Record of one write commit, kept for conflict detection.
#[derive(Debug)]
struct CommitRecord {
    version: i64,
    /// Write conflict ranges.
    writes: Vec<KeyRange>,
    /// Keys that received a new version.
    touched: Vec<Vec<u8>>,
}

struct Engine {
    version: i64,
    data: BTreeMap<Vec<u8>, History>,
    commits: VecDeque<CommitRecord>,
    /// Oldest read version that can still be served and validated.
    floor: i64,
    max_history: usize,
}

impl Engine {
    fn new(max_history: usize) -> Self {
        Self {
            version: 0,
            data: BTreeMap::new(),
            commits: VecDeque::new(),
            floor: 0,
            max_history,
        }
    }

    fn check_read_version(&self, read_version: i64) -> StoreResult<()> {
        if read_version < self.floor {
            return Err(StoreError::TransactionTooOld);
        }
        Ok(())
    }

    fn get(&self, key: &[u8], read_version: i64) -> StoreResult<Option<Bytes>> {
        self.check_read_version(read_version)?;
        Ok(self
            .data
            .get(key)
            .and_then(|history| value_at(history, read_version)))
    }

    fn range(&self, range: &KeyRange, read_version: i64) -> StoreResult<Vec<(Vec<u8>, Bytes)>> {
        self.check_read_version(read_version)?;
        if range.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .data
            .range(range.begin.clone()..range.end.clone())
            .filter_map(|(key, history)| {
                value_at(history, read_version).map(|value| (key.clone(), value))
            })
            .collect())
    }

    fn has_conflict(&self, read_version: i64, reads: &[KeyRange]) -> bool {
        self.commits
            .iter()
            .rev()
            .take_while(|commit| commit.version > read_version)
            .any(|commit| {
                commit
                    .writes
                    .iter()
                    .any(|write| reads.iter().any(|read| read.intersects(write)))
            })
    }

    fn apply(&mut self, cleared: &[KeyRange], writes: &BTreeMap<Vec<u8>, Option<Bytes>>) -> i64 {
        let version = self.version + 1;
        let mut conflict_ranges = Vec::with_capacity(cleared.len() + writes.len());
        let mut touched = Vec::new();

        for range in cleared {
            if range.is_empty() {
                continue;
            }
            conflict_ranges.push(range.clone());
            let live: Vec<Vec<u8>> = self
                .data
                .range(range.begin.clone()..range.end.clone())
                .filter(|(_, history)| value_at(history, self.version).is_some())
                .map(|(key, _)| key.clone())
                .collect();
            for key in live {
                if let Some(history) = self.data.get_mut(&key) {
                    history.push((version, None));
                }
                touched.push(key);
            }
        }

        for (key, value) in writes {
            conflict_ranges.push(KeyRange::single(key));
            let history = self.data.entry(key.clone()).or_default();
            match history.last_mut() {
                // A cleared range may already have tombstoned this key.
                Some((v, slot)) if *v == version => *slot = value.clone(),
                _ => history.push((version, value.clone())),
            }
            touched.push(key.clone());
        }

        self.version = version;
        self.commits.push_back(CommitRecord {
            version,
            writes: conflict_ranges,
            touched,
        });
        self.trim_history();
        version
    }

    fn trim_history(&mut self) {
        while self.commits.len() > self.max_history {
            let Some(oldest) = self.commits.pop_front() else {
                break;
            };
            self.floor = oldest.version;
            for key in oldest.touched {
                self.compact_key(&key);
            }
        }
    }

    /// Drop versions of `key` that no read at or above the floor can see.
    fn compact_key(&mut self, key: &[u8]) {
        let floor = self.floor;
        let Some(history) = self.data.get_mut(key) else {
            return;
        };

        let visible = history.iter().rposition(|(v, _)| *v <= floor);
        if let Some(index) = visible {
            history.drain(..index);
        }

        let only_tombstone =
            history.len() == 1 && history[0].0 <= floor && history[0].1.is_none();
        if history.is_empty() || only_tombstone {
            self.data.remove(key);
        }
    }
}

fn value_at(history: &History, read_version: i64) -> Option<Bytes> {
    history
        .iter()
        .rev()
        .find(|(version, _)| *version <= read_version)
        .and_then(|(_, value)| value.clone())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnState {
    Active,
    Committed(i64),
    Cancelled,
}

/// Transaction against a [`MemoryDatabase`].
pub struct MemoryTransaction {
    engine: Arc<Mutex<Engine>>,
    read_version: i64,
    /// Buffered writes; `None` clears the key.
    writes: BTreeMap<Vec<u8>, Option<Bytes>>,
    /// Buffered range clears, applied before `writes`.
    cleared: Vec<KeyRange>,
    /// Read conflict ranges.
    reads: Vec<KeyRange>,
    state: TxnState,
}

impl MemoryTransaction {
    fn new(engine: Arc<Mutex<Engine>>, read_version: i64) -> Self {
        Self {
            engine,
            read_version,
            writes: BTreeMap::new(),
            cleared: Vec::new(),
            reads: Vec::new(),
            state: TxnState::Active,
        }
    }

    fn ensure_active(&self) -> StoreResult<()> {
        match self.state {
            TxnState::Active => Ok(()),
            TxnState::Committed(_) => Err(StoreError::AlreadyCommitted),
            TxnState::Cancelled => Err(StoreError::TransactionCancelled),
        }
    }

    fn is_cleared(&self, key: &[u8]) -> bool {
        self.cleared.iter().any(|range| range.contains(key))
    }

    fn read_key(&mut self, key: &[u8]) -> StoreResult<Option<Bytes>> {
        self.ensure_active()?;

        if let Some(buffered) = self.writes.get(key) {
            return Ok(buffered.clone());
        }
        if self.is_cleared(key) {
            return Ok(None);
        }

        let value = self.engine.lock().get(key, self.read_version)?;
        self.reads.push(KeyRange::single(key));
        Ok(value)
    }

    fn read_range(&mut self, range: &KeyRange) -> StoreResult<Vec<KeyValue>> {
        self.ensure_active()?;
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let snapshot = self.engine.lock().range(range, self.read_version)?;
        self.reads.push(range.clone());

        let mut merged: BTreeMap<Vec<u8>, Bytes> = snapshot
            .into_iter()
            .filter(|(key, _)| !self.is_cleared(key))
            .collect();

        for (key, value) in self.writes.range(range.begin.clone()..range.end.clone()) {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged
            .into_iter()
            .map(|(key, value)| KeyValue::new(key, value))
            .collect())
    }

    fn try_commit(&mut self) -> StoreResult<()> {
        self.ensure_active()?;

        if self.writes.is_empty() && self.cleared.is_empty() {
            self.engine.lock().check_read_version(self.read_version)?;
            self.state = TxnState::Committed(-1);
            return Ok(());
        }

        let mut engine = self.engine.lock();
        engine.check_read_version(self.read_version)?;
        if engine.has_conflict(self.read_version, &self.reads) {
            return Err(StoreError::NotCommitted);
        }
        let version = engine.apply(&self.cleared, &self.writes);
        drop(engine);

        self.state = TxnState::Committed(version);
        Ok(())
    }
}

impl Transaction for MemoryTransaction {
    fn read_version(&mut self) -> StoreFuture<'_, i64> {
        let result = self.ensure_active().map(|_| self.read_version);
        Box::pin(async move { result })
    }

    fn get<'a>(&'a mut self, key: &'a [u8]) -> StoreFuture<'a, Option<Bytes>> {
        let result = self.read_key(key);
        Box::pin(async move { result })
    }

    fn get_range(&mut self, range: KeyRange) -> RangeIter<'_> {
        match self.read_range(&range) {
            Ok(items) => Box::new(items.into_iter().map(Ok)),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        if self.state == TxnState::Active {
            self.writes
                .insert(key.to_vec(), Some(Bytes::copy_from_slice(value)));
        }
    }

    fn clear(&mut self, key: &[u8]) {
        if self.state == TxnState::Active {
            self.writes.insert(key.to_vec(), None);
        }
    }

    fn clear_range(&mut self, range: KeyRange) {
        if self.state != TxnState::Active || range.is_empty() {
            return;
        }
        let shadowed: Vec<Vec<u8>> = self
            .writes
            .range(range.begin.clone()..range.end.clone())
            .map(|(key, _)| key.clone())
            .collect();
        for key in shadowed {
            self.writes.remove(&key);
        }
        self.cleared.push(range);
    }

    fn commit(&mut self) -> StoreFuture<'_, ()> {
        let result = self.try_commit();
        Box::pin(async move { result })
    }

    fn committed_version(&self) -> StoreResult<i64> {
        match self.state {
            TxnState::Committed(version) => Ok(version),
            TxnState::Active => Err(StoreError::NotYetCommitted),
            TxnState::Cancelled => Err(StoreError::TransactionCancelled),
        }
    }

    fn cancel(&mut self) {
        if self.state == TxnState::Active {
            self.state = TxnState::Cancelled;
            self.writes.clear();
            self.cleared.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(txn: &mut dyn Transaction, begin: &[u8], end: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        txn.get_range(KeyRange::new(begin.to_vec(), end.to_vec()))
            .map(|kv| {
                let kv = kv.unwrap();
                (kv.key.to_vec(), kv.value.to_vec())
            })
            .collect()
    }

    #[tokio::test]
    async fn test_set_then_get_in_same_transaction() {
        let db = MemoryDatabase::new();
        let mut txn = db.create_transaction().unwrap();

        txn.set(b"foo", b"bar");
        assert_eq!(txn.get(b"foo").await.unwrap(), Some(Bytes::from("bar")));
        assert_eq!(txn.get(b"missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_commit_advances_version() {
        let db = MemoryDatabase::new();
        let mut txn = db.create_transaction().unwrap();
        assert_eq!(txn.read_version().await.unwrap(), 0);

        txn.set(b"k", b"v");
        txn.commit().await.unwrap();
        assert_eq!(txn.committed_version().unwrap(), 1);
        assert_eq!(db.current_version(), 1);

        let mut next = db.create_transaction().unwrap();
        assert_eq!(next.read_version().await.unwrap(), 1);
        assert_eq!(next.get(b"k").await.unwrap(), Some(Bytes::from("v")));
    }

    #[tokio::test]
    async fn test_read_only_commit_reports_minus_one() {
        let db = MemoryDatabase::new();
        let mut txn = db.create_transaction().unwrap();
        let _ = txn.get(b"k").await.unwrap();
        txn.commit().await.unwrap();
        assert_eq!(txn.committed_version().unwrap(), -1);
        assert_eq!(db.current_version(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_isolation() {
        let db = MemoryDatabase::new();
        let mut reader = db.create_transaction().unwrap();

        let mut writer = db.create_transaction().unwrap();
        writer.set(b"k", b"v");
        writer.commit().await.unwrap();

        assert_eq!(reader.get(b"k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_conflicting_commit_fails() {
        let db = MemoryDatabase::new();
        let mut first = db.create_transaction().unwrap();
        let mut second = db.create_transaction().unwrap();

        let _ = first.get(b"counter").await.unwrap();
        let _ = second.get(b"counter").await.unwrap();
        first.set(b"counter", b"1");
        second.set(b"counter", b"2");

        first.commit().await.unwrap();
        assert_eq!(second.commit().await, Err(StoreError::NotCommitted));
    }

    #[tokio::test]
    async fn test_blind_writes_do_not_conflict() {
        let db = MemoryDatabase::new();
        let mut first = db.create_transaction().unwrap();
        let mut second = db.create_transaction().unwrap();

        first.set(b"k", b"1");
        second.set(b"k", b"2");
        first.commit().await.unwrap();
        second.commit().await.unwrap();

        let mut check = db.create_transaction().unwrap();
        assert_eq!(check.get(b"k").await.unwrap(), Some(Bytes::from("2")));
    }

    #[tokio::test]
    async fn test_range_read_conflicts_with_insert() {
        let db = MemoryDatabase::new();
        let mut scanner = db.create_transaction().unwrap();
        assert!(collect(scanner.as_mut(), b"a", b"z").is_empty());
        scanner.set(b"summary", b"0");

        let mut inserter = db.create_transaction().unwrap();
        inserter.set(b"m", b"1");
        inserter.commit().await.unwrap();

        assert_eq!(scanner.commit().await, Err(StoreError::NotCommitted));
    }

    #[tokio::test]
    async fn test_range_merges_buffered_writes() {
        let db = MemoryDatabase::new();
        let mut setup = db.create_transaction().unwrap();
        setup.set(b"a", b"1");
        setup.set(b"b", b"2");
        setup.set(b"c", b"3");
        setup.commit().await.unwrap();

        let mut txn = db.create_transaction().unwrap();
        txn.clear(b"b");
        txn.set(b"bb", b"22");
        assert_eq!(
            collect(txn.as_mut(), b"a", b"c"),
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"bb".to_vec(), b"22".to_vec())
            ]
        );
    }

    #[tokio::test]
    async fn test_clear_range_then_set() {
        let db = MemoryDatabase::new();
        let mut setup = db.create_transaction().unwrap();
        for key in [b"a", b"b", b"c"] {
            setup.set(key, b"x");
        }
        setup.commit().await.unwrap();

        let mut txn = db.create_transaction().unwrap();
        txn.set(b"b", b"shadowed");
        txn.clear_range(KeyRange::new(b"a".to_vec(), b"c".to_vec()));
        txn.set(b"b", b"after");
        assert_eq!(txn.get(b"a").await.unwrap(), None);
        assert_eq!(txn.get(b"b").await.unwrap(), Some(Bytes::from("after")));
        txn.commit().await.unwrap();

        let mut check = db.create_transaction().unwrap();
        assert_eq!(
            collect(check.as_mut(), b"a", b"z"),
            vec![
                (b"b".to_vec(), b"after".to_vec()),
                (b"c".to_vec(), b"x".to_vec())
            ]
        );
        assert_eq!(db.key_count(), 2);
    }

    #[tokio::test]
    async fn test_inverted_range_is_empty() {
        let db = MemoryDatabase::new();
        let mut txn = db.create_transaction().unwrap();
        txn.set(b"m", b"1");
        assert!(collect(txn.as_mut(), b"z", b"a").is_empty());
        txn.clear_range(KeyRange::new(b"z".to_vec(), b"a".to_vec()));
        assert_eq!(txn.get(b"m").await.unwrap(), Some(Bytes::from("1")));
    }

    #[tokio::test]
    async fn test_cancelled_transaction_rejects_operations() {
        let db = MemoryDatabase::new();
        let mut txn = db.create_transaction().unwrap();
        txn.set(b"k", b"v");
        txn.cancel();

        assert_eq!(txn.get(b"k").await, Err(StoreError::TransactionCancelled));
        assert_eq!(txn.commit().await, Err(StoreError::TransactionCancelled));
        assert_eq!(db.current_version(), 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_abandoned() {
        let db = MemoryDatabase::new();
        {
            let mut txn = db.create_transaction().unwrap();
            txn.set(b"k", b"v");
        }
        let mut check = db.create_transaction().unwrap();
        assert_eq!(check.get(b"k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_history_window_rejects_old_readers() {
        let db = MemoryDatabase::with_max_history(2);
        let mut stale = db.create_transaction().unwrap();

        for i in 0..3 {
            let mut txn = db.create_transaction().unwrap();
            txn.set(b"k", format!("{}", i).as_bytes());
            txn.commit().await.unwrap();
        }

        assert_eq!(stale.get(b"k").await, Err(StoreError::TransactionTooOld));

        let mut fresh = db.create_transaction().unwrap();
        assert_eq!(fresh.get(b"k").await.unwrap(), Some(Bytes::from("2")));
    }

    #[tokio::test]
    async fn test_compaction_keeps_visible_versions() {
        let db = MemoryDatabase::with_max_history(1);

        let mut txn = db.create_transaction().unwrap();
        txn.set(b"gone", b"1");
        txn.set(b"kept", b"1");
        txn.commit().await.unwrap();

        let mut txn = db.create_transaction().unwrap();
        txn.clear(b"gone");
        txn.commit().await.unwrap();

        let mut txn = db.create_transaction().unwrap();
        txn.set(b"other", b"1");
        txn.commit().await.unwrap();

        let mut check = db.create_transaction().unwrap();
        assert_eq!(check.get(b"kept").await.unwrap(), Some(Bytes::from("1")));
        assert_eq!(check.get(b"gone").await.unwrap(), None);
        assert_eq!(db.key_count(), 2);
    }
}
