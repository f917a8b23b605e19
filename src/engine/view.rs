//! Pinned read views
//!
//! A [`View`] is the memtable map plus the table list as of one instant.
//! Both are `Arc`s, so capturing a view never copies data.

use std::ops::Bound;

use bytes::Bytes;

use crate::error::Result;
use crate::memtable::{FrozenMap, MemTable, Record};
use crate::range::bounds_empty;
use crate::storage::{StorageManager, TableList};

#[derive(Clone)]
pub(crate) struct View {
    memtable: FrozenMap,
    tables: TableList,
}

impl View {
    /// Capture memtable and tables atomically with respect to flushes
    ///
    /// The table list is read under the memtable read lock. A flush publishes
    /// its table before it clears the memtable, so the pair never misses the
    /// flushed entries and never sees writes the memtable half lacks.
    pub(crate) fn capture(memtable: &MemTable, storage: &StorageManager) -> Self {
        let (memtable, tables) = memtable.frozen_with(|| storage.tables());
        Self { memtable, tables }
    }

    /// The latest live value for `key`
    pub(crate) fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let record = match self.memtable.get(key) {
            Some(record) => Some(record.clone()),
            None => StorageManager::get_from(&self.tables, key)?,
        };
        Ok(record.and_then(|r| r.value().cloned()))
    }

    /// Up to `count` records from every source, nearest first in scan
    /// direction; the memtable comes first, then tables newest → oldest
    pub(crate) fn collect(
        &self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        reverse: bool,
        count: usize,
    ) -> Result<Vec<Vec<(Bytes, Record)>>> {
        let mut sources = Vec::with_capacity(self.tables.len() + 1);
        if bounds_empty(lower, upper) {
            return Ok(sources);
        }

        let range = self.memtable.range::<[u8], _>((lower, upper));
        let clone = |(k, r): (&Bytes, &Record)| (k.clone(), r.clone());
        let memtable: Vec<(Bytes, Record)> = if reverse {
            range.rev().take(count).map(clone).collect()
        } else {
            range.take(count).map(clone).collect()
        };
        sources.push(memtable);

        for table in self.tables.iter() {
            sources.push(table.scan(lower, upper, reverse, count)?);
        }
        Ok(sources)
    }
}
