//! Store Handle
//!
//! [`Db`] is the entry point of the client contract: lifecycle, point reads
//! and writes, array batches, and the factories for iterators, chained
//! batches, snapshots and read streams.
//!
//! ## Lifecycle
//! ```text
//!   New ──open──▶ Opening ──▶ Open ──close──▶ Closing ──▶ Closed
//!                    │          ▲                 │          │
//!                    └─(fail)───┼─────────────────┘          │
//!                               └───────────open─────────────┘
//! ```
//! A failed or cancelled transition reverts to the prior status. Every open
//! starts a new epoch; iterators, batches and snapshots remember the epoch
//! they were created in and fail with `Lifecycle` once it has passed.
//!
//! Engine calls that may touch disk run on the tokio blocking pool.

mod batch;
mod iterator;
mod snapshot;
mod stream;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::backend::{Backend, Engine, RawOp};
use crate::codec::{Codec, Key, KeyEncoding, Value, ValueEncoding};
use crate::config::{DbOptions, OpenOptions, ReadOptions, WriteOptions};
use crate::engine::LsmBackend;
use crate::error::{EmberError, Result};
use crate::range::RangeOptions;

pub use batch::ChainedBatch;
pub use iterator::{DbIterator, Entry};
pub use snapshot::Snapshot;
pub use stream::{ReadStream, StreamItem};

// =============================================================================
// Status
// =============================================================================

/// Lifecycle status of a [`Db`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    New,
    Opening,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::New => "new",
            Status::Opening => "opening",
            Status::Open => "open",
            Status::Closing => "closing",
            Status::Closed => "closed",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Array Batch Operations
// =============================================================================

/// One element of an array batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Put { key: Key, value: Value },
    Del { key: Key },
}

impl BatchOp {
    pub fn put(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        BatchOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn del(key: impl Into<Key>) -> Self {
        BatchOp::Del { key: key.into() }
    }
}

// =============================================================================
// Shared State
// =============================================================================

struct DbState {
    status: Status,
    /// Present exactly while `Open`
    engine: Option<Arc<dyn Engine>>,
    /// Incremented on every successful open
    epoch: u64,
}

/// State shared by a handle and everything derived from it
pub(crate) struct DbInner {
    location: PathBuf,
    codec: Codec,
    backend: Arc<dyn Backend>,
    state: RwLock<DbState>,
}

impl DbInner {
    pub(crate) fn codec(&self) -> Codec {
        self.codec
    }

    /// The engine and current epoch, or `Lifecycle` unless open
    pub(crate) fn engine(&self) -> Result<(Arc<dyn Engine>, u64)> {
        let state = self.state.read();
        match (&state.engine, state.status) {
            (Some(engine), Status::Open) => Ok((Arc::clone(engine), state.epoch)),
            _ => Err(not_open(state.status)),
        }
    }

    /// Fail unless the handle is still open in `epoch`
    pub(crate) fn ensure_open(&self, epoch: u64) -> Result<()> {
        let state = self.state.read();
        if state.status == Status::Open && state.epoch == epoch {
            Ok(())
        } else if state.status == Status::Open {
            Err(EmberError::Lifecycle(
                "database was closed and reopened".to_string(),
            ))
        } else {
            Err(not_open(state.status))
        }
    }
}

fn not_open(status: Status) -> EmberError {
    EmberError::Lifecycle(format!("database is not open (status: {})", status))
}

/// Reverts the status if a transition does not complete, including when the
/// transition future is dropped mid-flight
struct Transition<'a> {
    inner: &'a DbInner,
    revert_to: Status,
    armed: bool,
}

impl Transition<'_> {
    fn complete(mut self) {
        self.armed = false;
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.state.write().status = self.revert_to;
        }
    }
}

/// Run engine work on the blocking pool
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| EmberError::Task(e.to_string()))?
}

/// Normalize an engine read into the client contract
pub(crate) fn read_value(
    codec: Codec,
    raw: Result<Option<Bytes>>,
    as_buffer: bool,
) -> Result<Value> {
    match raw {
        Ok(Some(bytes)) => codec.decode_value(bytes, as_buffer),
        Ok(None) | Err(EmberError::NotFound) => Err(EmberError::NotFound),
        Err(e) => Err(e),
    }
}

// =============================================================================
// Db
// =============================================================================

/// A handle on one store location
///
/// Cloning is cheap; clones share the same engine and lifecycle.
#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("location", &self.inner.location)
            .field("status", &self.status())
            .finish()
    }
}

impl Db {
    /// Create a handle on `location` backed by the bundled LSM engine
    pub fn new(location: impl AsRef<Path>, options: DbOptions) -> Result<Self> {
        let backend = Arc::new(LsmBackend::new(options.engine.clone()));
        Self::with_backend(location, options, backend)
    }

    /// Create a handle on `location` backed by `backend`
    pub fn with_backend(
        location: impl AsRef<Path>,
        options: DbOptions,
        backend: Arc<dyn Backend>,
    ) -> Result<Self> {
        let location = location.as_ref();
        if location.as_os_str().is_empty() {
            return Err(EmberError::Config(
                "location cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            inner: Arc::new(DbInner {
                location: location.to_path_buf(),
                codec: Codec::new(
                    options.key_encoding,
                    options.value_encoding,
                    options.json_decode,
                ),
                backend,
                state: RwLock::new(DbState {
                    status: Status::New,
                    engine: None,
                    epoch: 0,
                }),
            }),
        })
    }

    pub fn location(&self) -> &Path {
        &self.inner.location
    }

    pub fn status(&self) -> Status {
        self.inner.state.read().status
    }

    pub fn key_encoding(&self) -> KeyEncoding {
        self.inner.codec.key_encoding()
    }

    pub fn value_encoding(&self) -> ValueEncoding {
        self.inner.codec.value_encoding()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open the store; valid from `New` or `Closed`
    pub async fn open(&self, options: OpenOptions) -> Result<()> {
        let prior = {
            let mut state = self.inner.state.write();
            match state.status {
                Status::New | Status::Closed => {}
                status => {
                    return Err(EmberError::Lifecycle(format!(
                        "cannot open a database that is {}",
                        status
                    )))
                }
            }
            let prior = state.status;
            state.status = Status::Opening;
            prior
        };
        let transition = Transition {
            inner: &self.inner,
            revert_to: prior,
            armed: true,
        };

        let backend = Arc::clone(&self.inner.backend);
        let location = self.inner.location.clone();
        let engine = run_blocking(move || backend.open(&location, &options)).await?;

        {
            let mut state = self.inner.state.write();
            state.engine = Some(engine);
            state.status = Status::Open;
            state.epoch += 1;
        }
        transition.complete();

        tracing::info!("Opened database at {:?}", self.inner.location);
        Ok(())
    }

    /// Close the store; valid only while `Open`
    pub async fn close(&self) -> Result<()> {
        let engine = {
            let mut state = self.inner.state.write();
            let engine = match (&state.engine, state.status) {
                (Some(engine), Status::Open) => Arc::clone(engine),
                (_, status) => {
                    return Err(EmberError::Lifecycle(format!(
                        "cannot close a database that is {}",
                        status
                    )))
                }
            };
            state.status = Status::Closing;
            engine
        };
        let transition = Transition {
            inner: &self.inner,
            revert_to: Status::Open,
            armed: true,
        };

        run_blocking(move || engine.close()).await?;

        {
            let mut state = self.inner.state.write();
            state.engine = None;
            state.status = Status::Closed;
        }
        transition.complete();

        tracing::info!("Closed database at {:?}", self.inner.location);
        Ok(())
    }

    // =========================================================================
    // Point Operations
    // =========================================================================

    pub async fn get(&self, key: impl Into<Key>) -> Result<Value> {
        self.get_with_options(key, ReadOptions::default()).await
    }

    /// Read one value; a miss is always `NotFound`
    pub async fn get_with_options(&self, key: impl Into<Key>, options: ReadOptions) -> Result<Value> {
        let key = key.into();
        let (engine, _) = self.inner.engine()?;
        let codec = self.inner.codec;
        let raw_key = codec.encode_key(&key)?;

        let raw = run_blocking(move || engine.get(&raw_key)).await;
        read_value(codec, raw, options.as_buffer)
    }

    pub async fn put(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        self.put_with_options(key, value, WriteOptions::default())
            .await
    }

    pub async fn put_with_options(
        &self,
        key: impl Into<Key>,
        value: impl Into<Value>,
        options: WriteOptions,
    ) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        let (engine, _) = self.inner.engine()?;
        let raw_key = self.inner.codec.encode_key(&key)?;
        let raw_value = self.inner.codec.encode_value(&value)?;

        run_blocking(move || engine.put(raw_key, raw_value, &options)).await
    }

    pub async fn delete(&self, key: impl Into<Key>) -> Result<()> {
        self.delete_with_options(key, WriteOptions::default()).await
    }

    pub async fn delete_with_options(&self, key: impl Into<Key>, options: WriteOptions) -> Result<()> {
        let key = key.into();
        let (engine, _) = self.inner.engine()?;
        let raw_key = self.inner.codec.encode_key(&key)?;

        run_blocking(move || engine.delete(raw_key, &options)).await
    }

    // =========================================================================
    // Batches
    // =========================================================================

    pub async fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        self.batch_with_options(ops, WriteOptions::default()).await
    }

    /// Apply all operations atomically
    ///
    /// Every key and value is validated and serialized before the engine is
    /// involved; the first failure aborts the call with nothing written.
    pub async fn batch_with_options(&self, ops: Vec<BatchOp>, options: WriteOptions) -> Result<()> {
        let (engine, _) = self.inner.engine()?;
        let codec = self.inner.codec;

        let raw_ops = ops
            .iter()
            .map(|op| match op {
                BatchOp::Put { key, value } => Ok(RawOp::Put {
                    key: codec.encode_key(key)?,
                    value: codec.encode_value(value)?,
                }),
                BatchOp::Del { key } => Ok(RawOp::Delete {
                    key: codec.encode_key(key)?,
                }),
            })
            .collect::<Result<Vec<_>>>()?;

        run_blocking(move || engine.batch_apply(raw_ops, &options)).await
    }

    /// Start a chained batch
    pub fn chained_batch(&self) -> Result<ChainedBatch> {
        let (engine, epoch) = self.inner.engine()?;
        let batch = engine.batch_new()?;
        Ok(ChainedBatch::new(Arc::clone(&self.inner), epoch, batch))
    }

    // =========================================================================
    // Range Reads
    // =========================================================================

    /// Create an iterator over the live store
    pub fn iterator(&self, options: RangeOptions) -> Result<DbIterator> {
        let (engine, epoch) = self.inner.engine()?;
        let cursor = engine.iter_new(&options.normalize())?;
        Ok(DbIterator::new(
            Arc::clone(&self.inner),
            epoch,
            cursor,
            None,
            &options,
        ))
    }

    /// Pin the current state of the store
    pub fn snapshot(&self) -> Result<Snapshot> {
        let (engine, epoch) = self.inner.engine()?;
        let view = engine.snapshot_new()?;
        Ok(Snapshot::new(Arc::clone(&self.inner), epoch, view))
    }

    /// Stream entries as selected by `options.keys` / `options.values`
    pub fn read_stream(&self, options: RangeOptions) -> Result<ReadStream> {
        let (keys, values) = (options.keys, options.values);
        stream::check_projection(keys, values)?;
        ReadStream::new(self.iterator(options)?, keys, values)
    }

    pub fn key_stream(&self, options: RangeOptions) -> Result<ReadStream> {
        self.read_stream(options.keys(true).values(false))
    }

    pub fn value_stream(&self, options: RangeOptions) -> Result<ReadStream> {
        self.read_stream(options.keys(false).values(true))
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Approximate bytes used by keys in `[start, end)`
    pub async fn approximate_size(&self, start: impl Into<Key>, end: impl Into<Key>) -> Result<u64> {
        let (engine, _) = self.inner.engine()?;
        let (start, end) = range_bounds("approximate_size", start.into(), end.into())?;

        run_blocking(move || engine.approximate_size(&start, &end)).await
    }

    /// Compact the storage underlying `[start, end]`
    pub async fn compact_range(&self, start: impl Into<Key>, end: impl Into<Key>) -> Result<()> {
        let (engine, _) = self.inner.engine()?;
        let (start, end) = range_bounds("compact_range", start.into(), end.into())?;

        run_blocking(move || engine.compact_range(&start, &end)).await
    }

    /// Engine introspection; `None` for unknown properties
    pub fn get_property(&self, name: &str) -> Result<Option<String>> {
        let (engine, _) = self.inner.engine()?;
        if name.is_empty() {
            return Err(EmberError::InvalidArgument(
                "property name cannot be empty".to_string(),
            ));
        }
        Ok(engine.property(name))
    }

    /// Delete the store at `location`
    pub async fn destroy(location: impl AsRef<Path>) -> Result<()> {
        Self::destroy_with(location, Arc::new(LsmBackend::default())).await
    }

    pub async fn destroy_with(location: impl AsRef<Path>, backend: Arc<dyn Backend>) -> Result<()> {
        let location = maintenance_location(location.as_ref())?;
        run_blocking(move || backend.destroy(&location)).await
    }

    /// Salvage what can be read from a damaged store at `location`
    pub async fn repair(location: impl AsRef<Path>) -> Result<()> {
        Self::repair_with(location, Arc::new(LsmBackend::default())).await
    }

    pub async fn repair_with(location: impl AsRef<Path>, backend: Arc<dyn Backend>) -> Result<()> {
        let location = maintenance_location(location.as_ref())?;
        run_blocking(move || backend.repair(&location)).await
    }
}

fn range_bounds(op: &str, start: Key, end: Key) -> Result<(Bytes, Bytes)> {
    if start.is_empty() || end.is_empty() {
        return Err(EmberError::InvalidArgument(format!(
            "{}() requires non-empty start and end",
            op
        )));
    }
    Ok((start.to_bytes(), end.to_bytes()))
}

fn maintenance_location(location: &Path) -> Result<PathBuf> {
    if location.as_os_str().is_empty() {
        return Err(EmberError::Config(
            "location cannot be empty".to_string(),
        ));
    }
    Ok(location.to_path_buf())
}
