//! MemTable implementation
//!
//! Copy-on-write BTreeMap behind a RwLock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use super::Record;
use crate::backend::RawOp;

/// A frozen memtable view
pub type FrozenMap = Arc<BTreeMap<Bytes, Record>>;

/// In-memory table for recent writes
///
/// ## Concurrency:
/// - Reads take the read lock and never block on views held elsewhere
/// - Writes take the write lock; `Arc::make_mut` copies the map only when a
///   view is still pinned
/// - `size` is kept under the write lock and read lock-free
pub struct MemTable {
    data: RwLock<FrozenMap>,
    /// Approximate size in bytes (keys + values)
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Arc::new(BTreeMap::new())),
            size: AtomicUsize::new(0),
        }
    }

    /// Look up the latest record for a key
    pub fn get(&self, key: &[u8]) -> Option<Record> {
        self.data.read().get(key).cloned()
    }

    /// Put a key-value pair; returns the new size
    pub fn put(&self, key: Bytes, value: Bytes) -> usize {
        let mut data = self.data.write();
        self.insert(Arc::make_mut(&mut data), key, Record::Value(value))
    }

    /// Insert a tombstone; returns the new size
    pub fn delete(&self, key: Bytes) -> usize {
        let mut data = self.data.write();
        self.insert(Arc::make_mut(&mut data), key, Record::Tombstone)
    }

    /// Apply every operation under a single lock acquisition
    ///
    /// Readers observe all of the operations or none of them.
    pub fn apply(&self, ops: Vec<RawOp>) -> usize {
        let mut data = self.data.write();
        let map = Arc::make_mut(&mut data);
        let mut size = self.size();
        for op in ops {
            size = match op {
                RawOp::Put { key, value } => self.insert(map, key, Record::Value(value)),
                RawOp::Delete { key } => self.insert(map, key, Record::Tombstone),
            };
        }
        size
    }

    fn insert(&self, map: &mut BTreeMap<Bytes, Record>, key: Bytes, record: Record) -> usize {
        let key_len = key.len();
        let added = key_len + record.charge();
        let removed = map
            .insert(key, record)
            .map(|old| key_len + old.charge())
            .unwrap_or(0);

        let new_size = self.size.load(Ordering::Relaxed) + added - removed;
        self.size.store(new_size, Ordering::Relaxed);
        new_size
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Get entry count (tombstones included)
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Check if should flush (size >= limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    /// Pin the current contents
    pub fn frozen(&self) -> FrozenMap {
        Arc::clone(&self.data.read())
    }

    /// Pin the current contents together with whatever `f` captures while
    /// writers are held off
    pub fn frozen_with<T>(&self, f: impl FnOnce() -> T) -> (FrozenMap, T) {
        let data = self.data.read();
        (Arc::clone(&data), f())
    }

    /// Iterate a frozen copy in sorted key order
    pub fn iter(&self) -> MemTableIterator {
        let frozen = self.frozen();
        let entries: Vec<(Bytes, Record)> = frozen
            .iter()
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect();
        MemTableIterator {
            inner: entries.into_iter(),
        }
    }

    /// Clear all entries (after successful flush)
    ///
    /// Views pinned before the clear keep their contents.
    pub fn clear(&self) {
        let mut data = self.data.write();
        *data = Arc::new(BTreeMap::new());
        self.size.store(0, Ordering::Relaxed);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over MemTable entries
pub struct MemTableIterator {
    inner: std::vec::IntoIter<(Bytes, Record)>,
}

impl Iterator for MemTableIterator {
    type Item = (Bytes, Record);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
