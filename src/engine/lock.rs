//! Store lock
//!
//! One open engine per location. The lock is an advisory exclusive lock on
//! `LOCK` inside the store directory and lasts as long as the [`StoreLock`].

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{EmberError, Result};

pub(crate) const LOCK_FILENAME: &str = "LOCK";

pub(crate) struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Lock `location`, failing with [`EmberError::Locked`] if another
    /// handle holds it
    pub(crate) fn acquire(location: &Path) -> Result<Self> {
        let path = location.join(LOCK_FILENAME);

        // No truncate before locking: the holder's PID stays readable
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
            {
                return Err(EmberError::Locked(format!("{:?}", location)));
            }
            return Err(e.into());
        }

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;

        tracing::debug!("Acquired store lock {:?}", path);
        Ok(Self { file, path })
    }

    /// Release the lock and delete the lock file
    pub(crate) fn remove(self) -> Result<()> {
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to unlock {:?}: {}", self.path, e);
        }
    }
}
