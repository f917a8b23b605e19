//! Storage Module
//!
//! Persistent storage layer built from immutable SSTables.
//!
//! ## Responsibilities
//! - Persist flushed memtables to disk in sorted format
//! - Point lookups and bounded range scans
//! - Range-triggered compaction
//! - Salvage of damaged tables during repair

mod manager;
mod sstable;

pub use manager::{StorageManager, TableList};
pub use sstable::{SSTableBuilder, SSTableIterator, SSTableReader, TableSummary};
