//! Storage Manager
//!
//! Manages multiple SSTables and coordinates reads/writes.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup
//! - Search SSTables newest → oldest for reads
//! - Create new SSTables from MemTable flushes
//! - Merge SSTables during compaction

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{EmberError, Result};
use crate::memtable::Record;

use super::{SSTableBuilder, SSTableReader, TableSummary};

/// Open SSTable readers, ordered newest → oldest
pub type TableList = Arc<Vec<Arc<SSTableReader>>>;

/// Manages the storage layer
///
/// ## Concurrency:
/// - `sstables`: the list is replaced wholesale under the write lock, so a
///   reader that cloned the `Arc` keeps a stable set of tables
/// - `next_sstable_id`: Atomic counter (lock-free)
/// - Callers serialize `flush` and `compact`
pub struct StorageManager {
    /// Directory where SSTables are stored
    data_dir: PathBuf,

    sstables: RwLock<TableList>,

    /// Next ID for creating new SSTables
    next_sstable_id: AtomicU64,
}

impl StorageManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Discover existing SSTable files
    /// 3. Open readers for each (loads indexes into RAM)
    /// 4. Order by ID descending (newest first)
    pub fn open(path: &Path, verify_checksums: bool) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut sstable_ids = Self::discover(path)?;
        sstable_ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut sstables = Vec::with_capacity(sstable_ids.len());
        for id in &sstable_ids {
            let reader =
                SSTableReader::open_with(&Self::sstable_path_with_dir(path, *id), verify_checksums)?;
            sstables.push(Arc::new(reader));
        }

        let next_id = sstable_ids.first().map(|&id| id + 1).unwrap_or(1);

        tracing::debug!(
            "Storage opened at {:?}: {} SSTables, next id {}",
            path,
            sstables.len(),
            next_id
        );

        Ok(Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(Arc::new(sstables)),
            next_sstable_id: AtomicU64::new(next_id),
        })
    }

    /// Look up a key in all SSTables newest → oldest
    ///
    /// A tombstone is returned as such so the caller can stop searching.
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        Self::get_from(&self.tables(), key)
    }

    /// Look up a key in a pinned table list
    pub fn get_from(tables: &[Arc<SSTableReader>], key: &[u8]) -> Result<Option<Record>> {
        for reader in tables {
            if !reader.might_contain(key) {
                continue;
            }
            if let Some(record) = reader.get(key)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// The current table list
    pub fn tables(&self) -> TableList {
        Arc::clone(&self.sstables.read())
    }

    /// Write sorted entries to a new SSTable and publish it as the newest
    pub fn flush(&self, entries: &BTreeMap<Bytes, Record>) -> Result<TableSummary> {
        if entries.is_empty() {
            return Err(EmberError::Storage(
                "Cannot flush empty MemTable".to_string(),
            ));
        }

        let (metadata, reader) =
            self.build(entries.iter().map(|(k, r)| Ok((k.clone(), r.clone()))))?;

        let mut sstables = self.sstables.write();
        let mut list = Vec::with_capacity(sstables.len() + 1);
        list.push(reader);
        list.extend(sstables.iter().cloned());
        *sstables = Arc::new(list);

        tracing::debug!(
            "Flushed {} entries to {:?} ({} bytes)",
            metadata.entry_count,
            metadata.path,
            metadata.file_size
        );

        Ok(metadata)
    }

    /// Merge every SSTable into one if any of them overlaps `[start, end]`
    ///
    /// All tables take part, so tombstones have nothing left to shadow and
    /// are dropped. Returns `Ok(None)` when nothing overlapped. Old files are
    /// removed oldest first once the new list is published; readers that
    /// pinned the old list keep their open handles.
    pub fn compact(&self, start: &[u8], end: &[u8]) -> Result<Option<TableSummary>> {
        let tables = self.tables();
        if !tables.iter().any(|t| t.overlaps(start, end)) {
            return Ok(None);
        }

        // Oldest first so newer records overwrite older ones
        let mut merged: BTreeMap<Bytes, Record> = BTreeMap::new();
        for table in tables.iter().rev() {
            for entry in table.iter()? {
                let (key, record) = entry?;
                merged.insert(key, record);
            }
        }
        let live: Vec<(Bytes, Record)> = merged
            .into_iter()
            .filter(|(_, r)| !r.is_tombstone())
            .collect();

        let built = if live.is_empty() {
            None
        } else {
            Some(self.build(live.into_iter().map(Ok))?)
        };

        {
            let mut sstables = self.sstables.write();
            *sstables = Arc::new(built.iter().map(|(_, r)| Arc::clone(r)).collect());
        }

        // Oldest first: a crash part way leaves only the newest old tables,
        // and those still carry every tombstone for what they shadow
        for table in tables.iter().rev() {
            fs::remove_file(table.path())?;
        }

        tracing::info!(
            "Compacted {} SSTables into {}",
            tables.len(),
            if built.is_some() { 1 } else { 0 }
        );

        Ok(built.map(|(meta, _)| meta))
    }

    /// Sum of approximate data sizes for keys in `[start, end)`
    pub fn approximate_size(&self, start: &[u8], end: &[u8]) -> u64 {
        self.tables()
            .iter()
            .map(|t| t.approximate_size(start, end))
            .sum()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    /// Total bytes of all SSTable files
    pub fn total_size(&self) -> u64 {
        self.tables().iter().map(|t| t.file_size()).sum()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the next SSTable ID
    pub fn next_sstable_id(&self) -> u64 {
        self.next_sstable_id.load(Ordering::SeqCst)
    }

    /// Check every SSTable in `dir` and rename unreadable ones to `*.corrupt`
    ///
    /// Returns the number of tables set aside.
    pub fn quarantine_damaged(dir: &Path) -> Result<usize> {
        if !dir.exists() {
            return Ok(0);
        }

        let mut damaged = 0;
        for id in Self::discover(dir)? {
            let path = Self::sstable_path_with_dir(dir, id);
            if let Err(e) = SSTableReader::open_with(&path, true) {
                let target = path.with_extension("sst.corrupt");
                tracing::warn!("Setting aside damaged SSTable {:?}: {}", path, e);
                fs::rename(&path, &target)?;
                damaged += 1;
            }
        }
        Ok(damaged)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Write entries to a new table file and open a reader over it
    ///
    /// The file is written under a temporary name and renamed into place.
    fn build<I>(&self, entries: I) -> Result<(TableSummary, Arc<SSTableReader>)>
    where
        I: Iterator<Item = Result<(Bytes, Record)>>,
    {
        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = self.sstable_path(id);
        let tmp = path.with_extension("sst.tmp");

        let mut builder = SSTableBuilder::new(&tmp)?;
        for entry in entries {
            let (key, record) = entry?;
            builder.add_record(&key, &record)?;
        }
        let mut metadata = builder.finish()?;

        fs::rename(&tmp, &path)?;
        metadata.path = path.clone();

        let reader = SSTableReader::open(&path)?;
        Ok((metadata, Arc::new(reader)))
    }

    fn discover(dir: &Path) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let file_path = entry?.path();
            if file_path.is_file() {
                if let Some(id) = Self::parse_sstable_id(&file_path) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    fn sstable_path(&self, id: u64) -> PathBuf {
        Self::sstable_path_with_dir(&self.data_dir, id)
    }

    fn sstable_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    /// "sstable_000042.sst" → Some(42)
    fn parse_sstable_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        name.strip_prefix("sstable_")?.parse().ok()
    }
}
