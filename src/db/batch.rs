//! Chained batch
//!
//! Collects puts and deletes through the engine's accumulator and commits
//! them atomically in append order.

use std::sync::Arc;

use super::{run_blocking, DbInner};
use crate::backend::EngineBatch;
use crate::codec::{Key, Value};
use crate::config::WriteOptions;
use crate::error::{EmberError, Result};

/// A deferred sequence of mutations
pub struct ChainedBatch {
    db: Arc<DbInner>,
    epoch: u64,
    /// `None` after `write` or `close`
    batch: Option<Box<dyn EngineBatch>>,
}

impl ChainedBatch {
    pub(crate) fn new(db: Arc<DbInner>, epoch: u64, batch: Box<dyn EngineBatch>) -> Self {
        Self {
            db,
            epoch,
            batch: Some(batch),
        }
    }

    pub fn put(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<&mut Self> {
        let (key, value) = (key.into(), value.into());
        let codec = self.db.codec();
        let batch = self.active()?;
        batch.put(codec.encode_key(&key)?, codec.encode_value(&value)?);
        Ok(self)
    }

    pub fn del(&mut self, key: impl Into<Key>) -> Result<&mut Self> {
        let key = key.into();
        let codec = self.db.codec();
        let batch = self.active()?;
        batch.delete(codec.encode_key(&key)?);
        Ok(self)
    }

    /// Discard pending operations
    pub fn clear(&mut self) -> Result<&mut Self> {
        self.active()?.clear();
        Ok(self)
    }

    /// Number of pending operations
    pub fn len(&self) -> usize {
        self.batch.as_ref().map_or(0, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn write(&mut self) -> Result<()> {
        self.write_with_options(WriteOptions::default()).await
    }

    /// Commit every pending operation; the batch is spent afterwards even if
    /// the commit fails
    pub async fn write_with_options(&mut self, options: WriteOptions) -> Result<()> {
        self.active()?;
        let Some(batch) = self.batch.take() else {
            return Err(spent());
        };

        run_blocking(move || batch.write(&options)).await
    }

    /// Drop pending operations without applying them; idempotent
    pub fn close(&mut self) {
        self.batch = None;
    }

    fn active(&mut self) -> Result<&mut Box<dyn EngineBatch>> {
        let batch = self.batch.as_mut().ok_or_else(spent)?;
        self.db.ensure_open(self.epoch)?;
        Ok(batch)
    }
}

fn spent() -> EmberError {
    EmberError::Lifecycle("write() or close() already called on this batch".to_string())
}
