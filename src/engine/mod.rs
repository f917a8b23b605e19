//! Engine Module
//!
//! The bundled LSM storage engine behind the [`Backend`] contract.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, and Storage
//! - Handle concurrent read/write access
//! - Trigger flushes when MemTable is full
//! - Manage crash recovery on startup
//! - Hand out pinned views to cursors and snapshots
//!
//! ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
//!
//! - **Writes** (put/delete/batch/flush/compact): serialized by `write_lock`;
//!   each write goes WAL → memtable → (maybe) flush
//! - **Reads** (get/cursors/snapshots): capture a [`View`] and never take
//!   `write_lock`; SSTable readers serialize their own file access

mod batch;
mod cursor;
mod lock;
mod view;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::backend::{Backend, Engine, EngineBatch, EngineCursor, EngineSnapshot, RawOp};
use crate::config::{Config, OpenOptions, WriteOptions};
use crate::error::{EmberError, Result};
use crate::memtable::MemTable;
use crate::range::ScanRange;
use crate::storage::StorageManager;
use crate::wal::{Operation, WalRecovery, WalWriter};

use batch::LsmBatch;
use cursor::LsmCursor;
use lock::StoreLock;
use view::View;

const WAL_FILENAME: &str = "wal.log";
const SSTABLE_DIR: &str = "sstables";

// =============================================================================
// Backend
// =============================================================================

/// Opens LSM engines with a fixed [`Config`]
#[derive(Debug, Clone, Default)]
pub struct LsmBackend {
    config: Config,
}

impl LsmBackend {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Backend for LsmBackend {
    /// Open or create an engine at `location`
    ///
    /// On startup:
    /// 1. Apply `create_if_missing` / `error_if_exists`
    /// 2. Take the store lock; a second open fails with `Locked`
    /// 3. Load existing SSTables
    /// 4. Replay the WAL and flush what it held
    /// 5. Ready to serve requests
    fn open(&self, location: &Path, options: &OpenOptions) -> Result<Arc<dyn Engine>> {
        let engine = LsmEngine::open(location, self.config.clone(), options)?;
        Ok(Arc::new(engine))
    }

    /// Remove the engine's files; fails with `Locked` while the store is open
    fn destroy(&self, location: &Path) -> Result<()> {
        if !location.exists() {
            return Ok(());
        }

        let lock = StoreLock::acquire(location)?;

        let wal_path = location.join(WAL_FILENAME);
        if wal_path.exists() {
            fs::remove_file(&wal_path)?;
        }

        let sstable_dir = location.join(SSTABLE_DIR);
        if sstable_dir.exists() {
            fs::remove_dir_all(&sstable_dir)?;
        }

        lock.remove()?;

        if fs::read_dir(location)?.next().is_none() {
            fs::remove_dir(location)?;
        }

        tracing::info!("Destroyed store at {:?}", location);
        Ok(())
    }

    fn repair(&self, location: &Path) -> Result<()> {
        if !location.exists() {
            tracing::info!("Nothing to repair at {:?}", location);
            return Ok(());
        }

        let _lock = StoreLock::acquire(location)?;
        let (_, recovery) = WalRecovery::recover(&location.join(WAL_FILENAME))?;
        let damaged = StorageManager::quarantine_damaged(&location.join(SSTABLE_DIR))?;

        tracing::info!(
            "Repaired {:?}: {} WAL entries kept, {} corrupted, {} SSTables set aside",
            location,
            recovery.entries_recovered,
            recovery.entries_corrupted,
            damaged
        );
        Ok(())
    }
}

// =============================================================================
// Engine
// =============================================================================

/// State shared by the engine handle, its batches and its snapshots
pub(crate) struct LsmInner {
    config: Config,

    location: PathBuf,

    /// Write-ahead log for durability
    wal: Mutex<WalWriter>,

    /// In-memory table for recent writes (internal RwLock)
    memtable: MemTable,

    /// Persistent storage manager (internal RwLock on the table list)
    storage: StorageManager,

    /// Serializes write operations (put/delete/batch/flush/compact)
    write_lock: Mutex<()>,

    live_snapshots: AtomicUsize,

    closed: AtomicBool,

    /// Held from open until close or drop
    store_lock: Mutex<Option<StoreLock>>,
}

/// An open LSM engine
pub struct LsmEngine {
    inner: Arc<LsmInner>,
}

impl LsmEngine {
    pub fn open(location: &Path, config: Config, options: &OpenOptions) -> Result<Self> {
        let wal_path = location.join(WAL_FILENAME);
        let storage_dir = location.join(SSTABLE_DIR);
        let exists = wal_path.exists() || storage_dir.exists();

        if exists && options.error_if_exists {
            return Err(EmberError::Storage(format!(
                "{:?} already exists (error_if_exists is true)",
                location
            )));
        }
        if !exists && !options.create_if_missing {
            return Err(EmberError::Storage(format!(
                "{:?} does not exist (create_if_missing is false)",
                location
            )));
        }

        fs::create_dir_all(location)?;
        let lock = StoreLock::acquire(location)?;
        let storage = StorageManager::open(&storage_dir, config.paranoid_checks)?;
        let memtable = MemTable::new();

        // Replay the WAL, then make the recovered writes durable in a table
        // so the log can start empty
        let (entries, recovery) = WalRecovery::recover(&wal_path)?;
        if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
            tracing::info!(
                "WAL recovery: {} entries recovered, {} corrupted, last_lsn={}",
                recovery.entries_recovered,
                recovery.entries_corrupted,
                recovery.last_lsn
            );
        }
        for entry in entries {
            memtable.apply(entry.operations.into_iter().map(RawOp::from).collect());
        }

        let mut wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;
        if !memtable.is_empty() {
            tracing::info!(
                "Flushing {} recovered entries to SSTable",
                memtable.entry_count()
            );
            storage.flush(&memtable.frozen())?;
            memtable.clear();
            wal.truncate()?;
        }

        tracing::info!(
            "Engine opened at {:?} with {} SSTables",
            location,
            storage.sstable_count()
        );

        Ok(Self {
            inner: Arc::new(LsmInner {
                config,
                location: location.to_path_buf(),
                wal: Mutex::new(wal),
                memtable,
                storage,
                write_lock: Mutex::new(()),
                live_snapshots: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                store_lock: Mutex::new(Some(lock)),
            }),
        })
    }

    pub fn location(&self) -> &Path {
        &self.inner.location
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Flush memtable to disk regardless of its size
    pub fn flush(&self) -> Result<()> {
        let _write_guard = self.inner.write_lock.lock();
        self.inner.ensure_open()?;
        self.inner.flush_internal()
    }

    pub fn sstable_count(&self) -> usize {
        self.inner.storage.sstable_count()
    }
}

impl LsmInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EmberError::Lifecycle("engine is closed".to_string()));
        }
        Ok(())
    }

    fn view(&self) -> Result<View> {
        self.ensure_open()?;
        Ok(View::capture(&self.memtable, &self.storage))
    }

    /// Apply operations as one WAL frame and one memtable update
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Write to WAL (durability)
    /// 3. Write to MemTable
    /// 4. Check if flush needed
    ///
    /// Once the memtable holds the write it is acknowledged. A failed flush
    /// leaves the memtable and WAL intact and is retried by the next write
    /// or by close.
    pub(crate) fn apply(&self, ops: Vec<RawOp>, options: &WriteOptions) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let _write_guard = self.write_lock.lock();
        self.ensure_open()?;

        {
            let mut wal = self.wal.lock();
            wal.append_batch(ops.iter().cloned().map(Operation::from).collect())?;
            if options.sync {
                wal.sync()?;
            }
        }

        let new_size = self.memtable.apply(ops);

        if new_size >= self.config.memtable_size_limit {
            if let Err(e) = self.flush_internal() {
                tracing::warn!(
                    "Flush of {} byte memtable failed, will retry: {}",
                    new_size,
                    e
                );
            }
        }

        Ok(())
    }

    /// Called with write lock held
    fn flush_internal(&self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        // Publish the table before clearing the memtable; see View::capture
        self.storage.flush(&self.memtable.frozen())?;
        self.memtable.clear();
        self.wal.lock().truncate()?;

        Ok(())
    }

    fn stats(&self) -> String {
        format!(
            "location: {}\nsstables: {}\nsstable-bytes: {}\nmemtable-entries: {}\nmemtable-bytes: {}\nlive-snapshots: {}\nlast-lsn: {}\n",
            self.location.display(),
            self.storage.sstable_count(),
            self.storage.total_size(),
            self.memtable.entry_count(),
            self.memtable.size(),
            self.live_snapshots.load(Ordering::Acquire),
            self.wal.lock().last_lsn(),
        )
    }
}

impl Engine for LsmEngine {
    /// Close the engine gracefully
    ///
    /// Flushes pending data to disk, then releases the store lock.
    /// Closing twice is a no-op.
    fn close(&self) -> Result<()> {
        let _write_guard = self.inner.write_lock.lock();
        if self.inner.closed.load(Ordering::Acquire) {
            return Ok(());
        }

        self.inner.flush_internal()?;
        self.inner.wal.lock().sync()?;
        self.inner.closed.store(true, Ordering::Release);
        self.inner.store_lock.lock().take();

        tracing::info!("Engine closed at {:?}", self.inner.location);
        Ok(())
    }

    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. SSTables (newest to oldest)
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.inner.view()?.get(key)
    }

    fn put(&self, key: Bytes, value: Bytes, options: &WriteOptions) -> Result<()> {
        self.inner.apply(vec![RawOp::Put { key, value }], options)
    }

    fn delete(&self, key: Bytes, options: &WriteOptions) -> Result<()> {
        self.inner.apply(vec![RawOp::Delete { key }], options)
    }

    fn batch_apply(&self, ops: Vec<RawOp>, options: &WriteOptions) -> Result<()> {
        self.inner.apply(ops, options)
    }

    fn iter_new(&self, range: &ScanRange) -> Result<Box<dyn EngineCursor>> {
        let view = self.inner.view()?;
        Ok(Box::new(LsmCursor::new(view, range.clone())))
    }

    fn snapshot_new(&self) -> Result<Arc<dyn EngineSnapshot>> {
        let view = self.inner.view()?;
        let live = self.inner.live_snapshots.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!("Snapshot taken ({} live)", live);

        Ok(Arc::new(LsmSnapshot {
            view,
            inner: Arc::clone(&self.inner),
        }))
    }

    fn batch_new(&self) -> Result<Box<dyn EngineBatch>> {
        self.inner.ensure_open()?;
        Ok(Box::new(LsmBatch::new(Arc::clone(&self.inner))))
    }

    fn approximate_size(&self, start: &[u8], end: &[u8]) -> Result<u64> {
        self.inner.ensure_open()?;
        Ok(self.inner.storage.approximate_size(start, end))
    }

    fn compact_range(&self, start: &[u8], end: &[u8]) -> Result<()> {
        let _write_guard = self.inner.write_lock.lock();
        self.inner.ensure_open()?;

        self.inner.flush_internal()?;
        self.inner.storage.compact(start, end)?;
        Ok(())
    }

    fn property(&self, name: &str) -> Option<String> {
        let inner = &self.inner;
        match name {
            "emberkv.num-files" => Some(inner.storage.sstable_count().to_string()),
            "emberkv.memtable-bytes" => Some(inner.memtable.size().to_string()),
            "emberkv.memtable-entries" => Some(inner.memtable.entry_count().to_string()),
            "emberkv.live-snapshots" => {
                Some(inner.live_snapshots.load(Ordering::Acquire).to_string())
            }
            "emberkv.last-lsn" => Some(inner.wal.lock().last_lsn().to_string()),
            "emberkv.sstables" => Some(
                inner
                    .storage
                    .tables()
                    .iter()
                    .map(|t| {
                        let name = t
                            .path()
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        format!("{} entries={} bytes={}\n", name, t.entry_count(), t.file_size())
                    })
                    .collect(),
            ),
            "emberkv.stats" => Some(inner.stats()),
            _ => None,
        }
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// A pinned view; the live count drops when the last `Arc` goes away
struct LsmSnapshot {
    view: View,
    inner: Arc<LsmInner>,
}

impl EngineSnapshot for LsmSnapshot {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.view.get(key)
    }

    fn iter_new(&self, range: &ScanRange) -> Result<Box<dyn EngineCursor>> {
        Ok(Box::new(LsmCursor::new(self.view.clone(), range.clone())))
    }
}

impl Drop for LsmSnapshot {
    fn drop(&mut self) {
        let live = self.inner.live_snapshots.fetch_sub(1, Ordering::AcqRel) - 1;
        tracing::debug!("Snapshot released ({} live)", live);
    }
}
