//! WAL Reader
//!
//! Handles reading frames back from a log file.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::{Buf, Bytes};

use crate::error::{Result, TideError};

use super::HEADER_SIZE;

/// Reads frames from a log file
///
/// A frame cut short by a crash (torn tail) ends the log cleanly and is
/// reported by `is_truncated`. A complete frame whose checksum does not
/// match is an error.
pub struct WalReader {
    path: PathBuf,
    data: Bytes,
    position: usize,
    truncated: bool,
    failed: bool,
}

impl WalReader {
    /// Open a log file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            data: Bytes::from(data),
            position: 0,
            truncated: false,
            failed: false,
        })
    }

    /// Read the next payload, `None` at the end of the log
    pub fn next_record(&mut self) -> Result<Option<Bytes>> {
        let remaining = self.data.len() - self.position;
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < HEADER_SIZE {
            self.truncated = true;
            return Ok(None);
        }

        let mut header = &self.data[self.position..self.position + HEADER_SIZE];
        let crc = header.get_u32_le();
        let len = header.get_u32_le() as usize;

        let start = self.position + HEADER_SIZE;
        if self.data.len() - start < len {
            self.truncated = true;
            return Ok(None);
        }

        let payload = self.data.slice(start..start + len);
        if crc32fast::hash(&payload) != crc {
            return Err(TideError::WalCorruption(format!(
                "checksum mismatch in {} at offset {}",
                self.path.display(),
                self.position
            )));
        }

        self.position = start + len;
        Ok(Some(payload))
    }

    /// Whether the log ended in a partially written frame
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Byte offset of the next frame
    pub fn position(&self) -> usize {
        self.position
    }
}

impl Iterator for WalReader {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_record() {
            Ok(record) => record.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
