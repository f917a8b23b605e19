//! Range iterator with a prefetch page cache
//!
//! `next` serves entries from the cached page and only goes to the engine,
//! on the blocking pool, once the page is used up. `seek` drops the cache and
//! repositions the cursor without touching the engine.

use std::sync::Arc;

use super::{run_blocking, DbInner};
use crate::backend::{EngineCursor, EngineSnapshot, RawEntry};
use crate::codec::{Key, Value};
use crate::error::{EmberError, Result};
use crate::range::RangeOptions;

/// One iterated entry; a field is `None` when the range excluded it
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: Option<Key>,
    pub value: Option<Value>,
}

/// A lazy, cancellable scan over a key range
pub struct DbIterator {
    db: Arc<DbInner>,
    epoch: u64,
    /// `None` once ended, or while a page fetch owns it
    cursor: Option<Box<dyn EngineCursor>>,
    /// Hold on the snapshot this iterator reads from
    snapshot: Option<Arc<dyn EngineSnapshot>>,
    cache: std::vec::IntoIter<RawEntry>,
    finished: bool,
    ended: bool,
    key_as_buffer: bool,
    value_as_buffer: bool,
}

impl DbIterator {
    pub(crate) fn new(
        db: Arc<DbInner>,
        epoch: u64,
        cursor: Box<dyn EngineCursor>,
        snapshot: Option<Arc<dyn EngineSnapshot>>,
        options: &RangeOptions,
    ) -> Self {
        Self {
            db,
            epoch,
            cursor: Some(cursor),
            snapshot,
            cache: Vec::new().into_iter(),
            finished: false,
            ended: false,
            key_as_buffer: options.key_as_buffer,
            value_as_buffer: options.value_as_buffer,
        }
    }

    /// Yield the next entry, `Ok(None)` once the range is exhausted
    pub async fn next(&mut self) -> Result<Option<Entry>> {
        if self.ended {
            return Err(EmberError::Lifecycle(
                "cannot call next() after end()".to_string(),
            ));
        }
        self.db.ensure_open(self.epoch)?;

        loop {
            if let Some(raw) = self.cache.next() {
                return self.decode(raw).map(Some);
            }
            if self.finished {
                return Ok(None);
            }

            let Some(mut cursor) = self.cursor.take() else {
                // A previous next() was dropped while its fetch held the cursor
                self.ended = true;
                return Err(EmberError::Lifecycle(
                    "iterator was cancelled during next()".to_string(),
                ));
            };

            let (cursor, page) = run_blocking(move || {
                let page = cursor.next_page();
                Ok((cursor, page))
            })
            .await?;
            self.cursor = Some(cursor);

            let page = page?;
            self.finished = page.finished;
            self.cache = page.entries.into_iter();
        }
    }

    /// Reposition at the first key at or past `target` in scan direction
    pub fn seek(&mut self, target: impl Into<Key>) -> Result<()> {
        if self.ended {
            return Err(EmberError::Lifecycle(
                "cannot call seek() after end()".to_string(),
            ));
        }

        let target = target.into();
        if target.is_empty() {
            return Err(EmberError::InvalidArgument(
                "cannot seek() to an empty target".to_string(),
            ));
        }
        self.db.ensure_open(self.epoch)?;

        let Some(cursor) = self.cursor.as_mut() else {
            self.ended = true;
            return Err(EmberError::Lifecycle(
                "iterator was cancelled during next()".to_string(),
            ));
        };

        cursor.seek(target.as_bytes());
        self.cache = Vec::new().into_iter();
        self.finished = false;
        Ok(())
    }

    /// Release the cursor and any snapshot hold; idempotent
    pub async fn end(&mut self) -> Result<()> {
        if self.ended {
            return Ok(());
        }

        self.ended = true;
        self.cursor = None;
        self.snapshot = None;
        self.cache = Vec::new().into_iter();
        Ok(())
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    fn decode(&self, raw: RawEntry) -> Result<Entry> {
        let codec = self.db.codec();
        let key = raw.key.map(|k| codec.decode_key(k, self.key_as_buffer));
        let value = raw
            .value
            .map(|v| codec.decode_value(v, self.value_as_buffer))
            .transpose()?;
        Ok(Entry { key, value })
    }
}
