//! SSTable Reader
//!
//! Opens SSTable files and serves point lookups and bounded range scans via
//! an in-memory index.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{EmberError, Result};
use crate::memtable::Record;
use crate::range::bounds_empty;

use super::iterator::SSTableIterator;
use super::{
    read_u32, read_u64, ENTRY_HEADER_SIZE, FOOTER_SIZE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER,
    VERSION,
};

/// Reader for SSTable files with in-memory index
///
/// The file handle sits behind a `Mutex`, so every method takes `&self` and
/// a reader can be shared between threads behind an `Arc`.
pub struct SSTableReader {
    path: PathBuf,
    file: Mutex<BufReader<File>>,
    /// key → file offset
    index: BTreeMap<Bytes, u64>,
    entry_count: u64,
    /// Start of the index block, end of the data block
    index_offset: u64,
    data_crc: u32,
    file_size: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Loads the entire index into memory.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, false)
    }

    /// Open an SSTable, optionally checking the data block CRC
    pub fn open_with(path: &Path, verify_checksum: bool) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(EmberError::Storage(format!(
                "SSTable {:?} too small: {} bytes",
                path, file_size
            )));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(EmberError::Storage(format!(
                "Invalid SSTable magic in {:?}: {:?}",
                path,
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(EmberError::Storage(format!(
                "Unsupported SSTable version: {}",
                version
            )));
        }

        let entry_count = read_u64(&header[6..14]);

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let index_offset = read_u64(&footer[0..8]);
        let data_crc = read_u32(&footer[8..12]);

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(EmberError::Storage(format!(
                "SSTable {:?} has invalid index offset {}",
                path, index_offset
            )));
        }

        let mut index_data = vec![0u8; (file_size - FOOTER_SIZE - index_offset) as usize];
        file.seek(SeekFrom::Start(index_offset))?;
        file.read_exact(&mut index_data)?;

        // [key_len(4)][offset(8)][key]
        let mut index = BTreeMap::new();
        let mut pos = 0;
        while pos < index_data.len() {
            if pos + 12 > index_data.len() {
                return Err(EmberError::Storage(format!(
                    "SSTable {:?} has a truncated index",
                    path
                )));
            }
            let key_len = read_u32(&index_data[pos..]) as usize;
            let offset = read_u64(&index_data[pos + 4..]);
            pos += 12;

            if pos + key_len > index_data.len() {
                return Err(EmberError::Storage(format!(
                    "SSTable {:?} has a truncated index",
                    path
                )));
            }
            index.insert(Bytes::copy_from_slice(&index_data[pos..pos + key_len]), offset);
            pos += key_len;
        }

        if index.len() as u64 != entry_count {
            return Err(EmberError::Storage(format!(
                "SSTable {:?} index holds {} keys, header says {}",
                path,
                index.len(),
                entry_count
            )));
        }

        let reader = Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufReader::new(file)),
            index,
            entry_count,
            index_offset,
            data_crc,
            file_size,
        };

        if verify_checksum {
            reader.verify()?;
        }

        Ok(reader)
    }

    /// Recompute the data block CRC and compare it with the footer
    pub fn verify(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(HEADER_SIZE))?;

        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = self.index_offset - HEADER_SIZE;
        let mut buf = vec![0u8; 64 * 1024];
        while remaining > 0 {
            let n = remaining.min(buf.len() as u64) as usize;
            file.read_exact(&mut buf[..n])?;
            hasher.update(&buf[..n]);
            remaining -= n as u64;
        }

        let actual = hasher.finalize();
        if actual != self.data_crc {
            return Err(EmberError::Storage(format!(
                "SSTable {:?} checksum mismatch: expected {:08x}, got {:08x}",
                self.path, self.data_crc, actual
            )));
        }
        Ok(())
    }

    /// Look up a key
    ///
    /// Returns:
    /// - `Ok(Some(Record::Value(_)))`: key found with value
    /// - `Ok(Some(Record::Tombstone))`: key deleted as of this table
    /// - `Ok(None)`: key not in this SSTable
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        match self.index.get(key) {
            Some(&offset) => Ok(Some(self.read_at(offset)?.1)),
            None => Ok(None),
        }
    }

    /// Read the entry stored at `offset`
    pub fn read_at(&self, offset: u64) -> Result<(Bytes, Record)> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; ENTRY_HEADER_SIZE];
        file.read_exact(&mut header)?;
        let key_len = read_u32(&header[0..4]) as usize;
        let val_len = read_u32(&header[4..8]);

        let mut key = vec![0u8; key_len];
        file.read_exact(&mut key)?;

        let record = if val_len == TOMBSTONE_MARKER {
            Record::Tombstone
        } else {
            let mut value = vec![0u8; val_len as usize];
            file.read_exact(&mut value)?;
            Record::Value(Bytes::from(value))
        };

        Ok((Bytes::from(key), record))
    }

    /// Read up to `count` entries inside the bounds, walking the index in
    /// ascending order or descending when `reverse` is set
    pub fn scan(
        &self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        reverse: bool,
        count: usize,
    ) -> Result<Vec<(Bytes, Record)>> {
        if bounds_empty(lower, upper) {
            return Ok(Vec::new());
        }

        let range = self.index.range::<[u8], _>((lower, upper));
        let offsets: Vec<u64> = if reverse {
            range.rev().take(count).map(|(_, &off)| off).collect()
        } else {
            range.take(count).map(|(_, &off)| off).collect()
        };

        offsets.into_iter().map(|off| self.read_at(off)).collect()
    }

    /// Approximate bytes of data stored for keys in `[start, end)`
    pub fn approximate_size(&self, start: &[u8], end: &[u8]) -> u64 {
        if start >= end {
            return 0;
        }
        let offset_of = |key: &[u8]| {
            self.index
                .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
                .next()
                .map(|(_, &off)| off)
                .unwrap_or(self.index_offset)
        };
        offset_of(end) - offset_of(start)
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the minimum key in this SSTable
    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.keys().next().map(|k| &k[..])
    }

    /// Get the maximum key in this SSTable
    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.keys().next_back().map(|k| &k[..])
    }

    /// Returns false only if the key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false,
        }
    }

    /// True if the table's key span intersects `[start, end]`
    pub fn overlaps(&self, start: &[u8], end: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => min <= end && max >= start,
            _ => false,
        }
    }

    /// Sequential iterator over all entries on a separate file handle
    pub fn iter(&self) -> Result<SSTableIterator> {
        SSTableIterator::new(&self.path, self.index_offset)
    }
}
