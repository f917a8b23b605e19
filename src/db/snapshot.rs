//! Snapshots
//!
//! A [`Snapshot`] reads from the store as it was when the snapshot was taken.
//! The handle and every iterator created from it each hold one reference to
//! the engine view; the view is released when the last hold goes away.
//!
//! `release` consumes the handle, so it cannot run twice:
//!
//! ```compile_fail
//! # async fn demo(db: emberkv::Db) -> emberkv::Result<()> {
//! let snapshot = db.snapshot()?;
//! snapshot.release();
//! snapshot.release();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use super::{read_value, run_blocking, DbInner, DbIterator, ReadStream};
use crate::backend::EngineSnapshot;
use crate::codec::{Key, Value};
use crate::config::ReadOptions;
use crate::error::Result;
use crate::range::RangeOptions;

/// A point-in-time view of a [`Db`](super::Db)
pub struct Snapshot {
    db: Arc<DbInner>,
    epoch: u64,
    view: Arc<dyn EngineSnapshot>,
}

impl Snapshot {
    pub(crate) fn new(db: Arc<DbInner>, epoch: u64, view: Arc<dyn EngineSnapshot>) -> Self {
        Self { db, epoch, view }
    }

    pub async fn get(&self, key: impl Into<Key>) -> Result<Value> {
        self.get_with_options(key, ReadOptions::default()).await
    }

    /// Read one value as of the snapshot; a miss is always `NotFound`
    pub async fn get_with_options(&self, key: impl Into<Key>, options: ReadOptions) -> Result<Value> {
        let key = key.into();
        self.db.ensure_open(self.epoch)?;
        let codec = self.db.codec();
        let raw_key = codec.encode_key(&key)?;

        let view = Arc::clone(&self.view);
        let raw = run_blocking(move || view.get(&raw_key)).await;
        read_value(codec, raw, options.as_buffer)
    }

    /// Iterate the snapshot; the iterator holds the view until it ends
    pub fn iterator(&self, options: RangeOptions) -> Result<DbIterator> {
        self.db.ensure_open(self.epoch)?;
        let cursor = self.view.iter_new(&options.normalize())?;
        Ok(DbIterator::new(
            Arc::clone(&self.db),
            self.epoch,
            cursor,
            Some(Arc::clone(&self.view)),
            &options,
        ))
    }

    pub fn read_stream(&self, options: RangeOptions) -> Result<ReadStream> {
        let (keys, values) = (options.keys, options.values);
        super::stream::check_projection(keys, values)?;
        ReadStream::new(self.iterator(options)?, keys, values)
    }

    pub fn key_stream(&self, options: RangeOptions) -> Result<ReadStream> {
        self.read_stream(options.keys(true).values(false))
    }

    pub fn value_stream(&self, options: RangeOptions) -> Result<ReadStream> {
        self.read_stream(options.keys(false).values(true))
    }

    /// Current number of holds: this handle plus every live iterator
    pub fn hold_count(&self) -> usize {
        Arc::strong_count(&self.view)
    }

    /// Drop this handle's hold
    pub fn release(self) {
        tracing::debug!("Snapshot handle released ({} holds before)", self.hold_count());
    }
}
