//! Engine Contract
//!
//! The narrow operation set the client layer drives. Any storage engine that
//! implements these traits can sit behind a [`Db`](crate::Db) without touching
//! call sites; the crate ships one implementation, [`LsmBackend`](crate::engine::LsmBackend).
//!
//! All methods are blocking. The client layer moves every call that may touch
//! disk onto the runtime's blocking pool.
//!
//! ## Resource release
//! - Cursors, snapshots and batch accumulators are released by `Drop`.
//! - A snapshot is shared as `Arc<dyn EngineSnapshot>`; the engine view is
//!   released when the last clone goes away.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::{OpenOptions, WriteOptions};
use crate::error::Result;
use crate::range::ScanRange;

/// One entry of a prefetch page; a field is `None` when the scan skips it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
}

/// A batch of entries fetched in one engine round-trip
#[derive(Debug, Default)]
pub struct Page {
    pub entries: Vec<RawEntry>,
    /// No entries remain past this page
    pub finished: bool,
}

/// A serialized mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOp {
    Put { key: Bytes, value: Bytes },
    Delete { key: Bytes },
}

/// Opens engines and runs location-level maintenance
pub trait Backend: Send + Sync {
    fn open(&self, location: &Path, options: &OpenOptions) -> Result<Arc<dyn Engine>>;

    /// Delete every store file at `location`
    fn destroy(&self, location: &Path) -> Result<()>;

    /// Salvage what can be read from a damaged store
    fn repair(&self, location: &Path) -> Result<()>;
}

/// An open storage engine
pub trait Engine: Send + Sync {
    fn close(&self) -> Result<()>;

    /// `Ok(None)` on a miss
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    fn put(&self, key: Bytes, value: Bytes, options: &WriteOptions) -> Result<()>;

    fn delete(&self, key: Bytes, options: &WriteOptions) -> Result<()>;

    /// Apply every operation or none
    fn batch_apply(&self, ops: Vec<RawOp>, options: &WriteOptions) -> Result<()>;

    fn iter_new(&self, range: &ScanRange) -> Result<Box<dyn EngineCursor>>;

    fn snapshot_new(&self) -> Result<Arc<dyn EngineSnapshot>>;

    fn batch_new(&self) -> Result<Box<dyn EngineBatch>>;

    /// Approximate bytes used by keys in `[start, end)`
    fn approximate_size(&self, start: &[u8], end: &[u8]) -> Result<u64>;

    fn compact_range(&self, start: &[u8], end: &[u8]) -> Result<()>;

    /// `None` for unknown property names
    fn property(&self, name: &str) -> Option<String>;
}

/// A positioned scan over a key range
pub trait EngineCursor: Send {
    /// Reposition at the first key at or past `target` in scan direction
    fn seek(&mut self, target: &[u8]);

    /// Fetch the next page; an empty page is always `finished`
    fn next_page(&mut self) -> Result<Page>;
}

/// A pinned point-in-time view
pub trait EngineSnapshot: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    fn iter_new(&self, range: &ScanRange) -> Result<Box<dyn EngineCursor>>;
}

/// Accumulates mutations for one atomic commit
pub trait EngineBatch: Send {
    fn put(&mut self, key: Bytes, value: Bytes);

    fn delete(&mut self, key: Bytes);

    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply the accumulated operations in append order
    fn write(self: Box<Self>, options: &WriteOptions) -> Result<()>;
}
