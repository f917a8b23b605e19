//! WAL Reader
//!
//! Handles reading frames from the WAL file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::entry::HEADER_SIZE;
use super::WalEntry;
use crate::error::{EmberError, Result};

/// Outcome of reading one frame
pub(crate) enum Frame {
    Entry(WalEntry),
    /// Clean end of file
    Eof,
    /// A frame was cut short by a crash
    Partial,
    /// A complete frame failed verification
    Corrupt(String),
}

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset just past the last frame read successfully
    position: u64,
    file_len: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at a clean end of file and `WalCorruption` for a
    /// torn or damaged frame.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        match self.read_frame()? {
            Frame::Entry(entry) => Ok(Some(entry)),
            Frame::Eof => Ok(None),
            Frame::Partial => Err(EmberError::WalCorruption(format!(
                "Partial frame at offset {}",
                self.position
            ))),
            Frame::Corrupt(msg) => Err(EmberError::WalCorruption(msg)),
        }
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }

    /// Byte offset of the end of the last good frame
    pub fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn read_frame(&mut self) -> Result<Frame> {
        let remaining = self.file_len - self.position;
        if remaining == 0 {
            return Ok(Frame::Eof);
        }
        if remaining < HEADER_SIZE as u64 {
            return Ok(Frame::Partial);
        }

        let mut header = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header)?;

        // Length is checked against the file before allocating
        let payload_len = WalEntry::payload_len(&header);
        if remaining < (HEADER_SIZE + payload_len) as u64 {
            return Ok(Frame::Partial);
        }

        let mut payload = vec![0u8; payload_len];
        self.reader.read_exact(&mut payload)?;

        match WalEntry::decode(&header, &payload) {
            Ok(entry) => {
                self.position += (HEADER_SIZE + payload_len) as u64;
                Ok(Frame::Entry(entry))
            }
            Err(e) => Ok(Frame::Corrupt(e.to_string())),
        }
    }
}

/// Iterator over WAL entries; stops after the first error
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
