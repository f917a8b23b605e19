//! SSTable Iterator
//!
//! Sequential iteration over all entries in an SSTable.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use bytes::Bytes;

use crate::error::Result;
use crate::memtable::Record;

use super::{read_u32, ENTRY_HEADER_SIZE, HEADER_SIZE, TOMBSTONE_MARKER};

/// Iterator over SSTable entries in sorted key order
pub struct SSTableIterator {
    file: BufReader<File>,
    /// Start of the index block
    end_offset: u64,
    current_offset: u64,
    failed: bool,
}

impl SSTableIterator {
    pub(super) fn new(path: &Path, end_offset: u64) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        Ok(Self {
            file,
            end_offset,
            current_offset: HEADER_SIZE,
            failed: false,
        })
    }

    fn read_entry(&mut self) -> Result<(Bytes, Record)> {
        let mut header = [0u8; ENTRY_HEADER_SIZE];
        self.file.read_exact(&mut header)?;
        let key_len = read_u32(&header[0..4]) as usize;
        let val_len = read_u32(&header[4..8]);

        let mut key = vec![0u8; key_len];
        self.file.read_exact(&mut key)?;
        let mut entry_size = (ENTRY_HEADER_SIZE + key_len) as u64;

        let record = if val_len == TOMBSTONE_MARKER {
            Record::Tombstone
        } else {
            let mut value = vec![0u8; val_len as usize];
            self.file.read_exact(&mut value)?;
            entry_size += val_len as u64;
            Record::Value(Bytes::from(value))
        };

        self.current_offset += entry_size;
        Ok((Bytes::from(key), record))
    }
}

impl Iterator for SSTableIterator {
    type Item = Result<(Bytes, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.current_offset >= self.end_offset {
            return None;
        }

        let entry = self.read_entry();
        self.failed = entry.is_err();
        Some(entry)
    }
}
