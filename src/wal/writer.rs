//! WAL Writer
//!
//! Handles appending frames to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::reader::{Frame, WalReader};
use super::{Operation, WalEntry};
use crate::config::WalSyncStrategy;
use crate::error::Result;

/// Writes entries to the WAL file
pub struct WalWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    /// LSN assigned to the next frame
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Frames written since the last fsync
    uncommitted: usize,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// LSNs continue after the last valid frame already in the file.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let next_lsn = if path.exists() {
            Self::scan_last_lsn(path)? + 1
        } else {
            1
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        tracing::debug!("WAL opened at {:?}, next LSN {}", path, next_lsn);

        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            next_lsn,
            sync_strategy,
            uncommitted: 0,
        })
    }

    fn scan_last_lsn(path: &Path) -> Result<u64> {
        let mut reader = WalReader::open(path)?;
        let mut last = 0;
        while let Frame::Entry(entry) = reader.read_frame()? {
            last = entry.lsn;
        }
        Ok(last)
    }

    /// Append a single operation as its own frame
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        self.append_batch(vec![operation])
    }

    /// Append all operations as one frame
    ///
    /// Returns the frame's LSN.
    pub fn append_batch(&mut self, operations: Vec<Operation>) -> Result<u64> {
        let lsn = self.next_lsn;
        let frame = WalEntry::new(lsn, operations).serialize()?;

        self.writer.write_all(&frame)?;
        self.next_lsn += 1;
        self.uncommitted += 1;

        match self.sync_strategy {
            WalSyncStrategy::EveryWrite => self.sync()?,
            WalSyncStrategy::EveryNEntries { count } => {
                if self.uncommitted >= count {
                    self.sync()?;
                }
            }
        }

        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// Discard every frame; called once the memtable is safely on disk
    pub fn truncate(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().set_len(0)?;
        self.writer.get_ref().sync_all()?;
        self.uncommitted = 0;

        tracing::debug!("WAL truncated at {:?}", self.path);
        Ok(())
    }

    /// The LSN the next frame will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// LSN of the last frame written, 0 if none
    pub fn last_lsn(&self) -> u64 {
        self.next_lsn - 1
    }

    /// Frames written since the last fsync
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
