//! WAL Writer
//!
//! Handles appending frames to a log file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use crate::error::{Result, TideError};

use super::{encode_frame, log_path};

/// Append-only file a log is written to
pub trait LogFile: Send {
    /// Write the whole buffer at the end of the file
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Force written data onto stable storage
    fn sync(&mut self) -> io::Result<()>;

    /// Cut the file back to `len` bytes
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        Write::write_all(self, buf)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Creates the files new logs are written to
pub trait LogStore: Send + Sync {
    fn create(&self, path: &Path) -> io::Result<Box<dyn LogFile>>;
}

/// Logs as plain files on the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskLogStore;

impl LogStore for DiskLogStore {
    fn create(&self, path: &Path) -> io::Result<Box<dyn LogFile>> {
        // Append mode keeps writes at the end after a rollback truncation
        let file = OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(path)?;
        Ok(Box::new(file))
    }
}

/// Writes frames to one log file
///
/// A failed append is rolled back by truncating to the end of the last
/// complete frame. If the rollback itself fails the writer is poisoned.
pub struct WalWriter {
    number: u64,
    file: Box<dyn LogFile>,
    /// End of the last complete frame
    offset: u64,
    frames: u64,
    poisoned: bool,
}

impl WalWriter {
    /// Wrap an empty log file
    pub fn new(number: u64, file: Box<dyn LogFile>) -> Self {
        Self {
            number,
            file,
            offset: 0,
            frames: 0,
            poisoned: false,
        }
    }

    /// Create log `number` in `dir`
    pub fn create(store: &dyn LogStore, dir: &Path, number: u64) -> Result<Self> {
        let file = store.create(&log_path(dir, number))?;
        Ok(Self::new(number, file))
    }

    /// Append one payload, forcing it to stable storage if `sync` is set
    ///
    /// On error nothing of this payload remains in the log.
    pub fn append(&mut self, payload: &[u8], sync: bool) -> Result<()> {
        if self.poisoned {
            return Err(TideError::WalWrite(format!(
                "log {} is unusable after a failed rollback",
                self.number
            )));
        }

        let frame = encode_frame(payload)?;
        let start = self.offset;

        if let Err(err) = self.file.write_all(&frame) {
            self.rollback(start);
            return Err(err.into());
        }
        if sync {
            if let Err(err) = self.file.sync() {
                self.rollback(start);
                return Err(err.into());
            }
        }

        self.offset = start + frame.len() as u64;
        self.frames += 1;
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync()?;
        Ok(())
    }

    fn rollback(&mut self, offset: u64) {
        if let Err(err) = self.file.truncate(offset) {
            tracing::error!(
                log = self.number,
                offset,
                error = %err,
                "Failed to roll back partial log frame"
            );
            self.poisoned = true;
        }
    }

    /// Log number
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Bytes of complete frames written
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of frames written
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}
