//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Track size for flush triggers
//! - Ordered iteration for SSTable creation and range scans
//! - Cheap point-in-time views for iterators and snapshots
//!
//! ## Data Structure Choice
//! A `BTreeMap` behind `RwLock<Arc<..>>`, copied on write:
//! - Ordered keys (required for SSTable generation and scans)
//! - Pinning a view is an `Arc` clone
//! - A writer only pays for a copy while some view still holds the old map

mod table;

use bytes::Bytes;

pub use table::{FrozenMap, MemTable, MemTableIterator};

/// The state of a key as recorded by the most recent write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A live value
    Value(Bytes),

    /// A tombstone (deleted key)
    Tombstone,
}

impl Record {
    /// The live value, `None` for a tombstone
    pub fn value(&self) -> Option<&Bytes> {
        match self {
            Record::Value(v) => Some(v),
            Record::Tombstone => None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Record::Tombstone)
    }

    /// Bytes charged against the memtable size limit
    pub(crate) fn charge(&self) -> usize {
        match self {
            Record::Value(v) => v.len(),
            Record::Tombstone => 0,
        }
    }
}
