//! Sorted tables on disk
//!
//! A table is written once by [`SSTableBuilder`] and never modified. Every
//! integer is little-endian.
//!
//! ```text
//! offset 0             "EMKV" magic, u16 format version, u64 entry count
//! offset 14            entries, strictly ascending by key:
//!                        u32 key length, u32 value length, key, value
//! index_offset         one record per entry:
//!                        u32 key length, u64 entry offset, key
//! file_len - 16        u64 index_offset, u32 CRC32 of the entry region, 4 zero bytes
//! ```
//!
//! A deleted key keeps its entry so it can shadow older tables: its value
//! length is `u32::MAX` and no value bytes follow. Readers load the whole
//! index into memory on open.

mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;

// =============================================================================
// Layout
// =============================================================================

pub(crate) const MAGIC: &[u8; 4] = b"EMKV";

pub(crate) const VERSION: u16 = 1;

/// Bytes before the first entry
pub(crate) const HEADER_SIZE: u64 = 4 + 2 + 8;

/// Bytes after the index
pub(crate) const FOOTER_SIZE: u64 = 8 + 4 + 4;

/// Bytes before an entry's key
pub(crate) const ENTRY_HEADER_SIZE: usize = 4 + 4;

/// Value length recorded for a deleted key
pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

pub(crate) fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

pub(crate) fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

// =============================================================================
// Table Summary
// =============================================================================

/// What a finished build produced: file location, key span and size
#[derive(Debug, Clone)]
pub struct TableSummary {
    pub path: PathBuf,
    /// Tombstones included
    pub entry_count: u64,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub file_size: u64,
}

impl TableSummary {
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// False when `key` falls outside the table's key span
    pub fn might_contain(&self, key: &[u8]) -> bool {
        (self.min_key.as_slice()..=self.max_key.as_slice()).contains(&key)
    }
}
