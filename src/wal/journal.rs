//! The engine's current log

use parking_lot::Mutex;

use crate::error::Result;

use super::WalWriter;

/// Current log, shared by the write leader and the `WalWorker`
///
/// Only one of them appends at a time: the leader either appends itself or
/// hands the batch to the worker and waits for its acknowledgement.
pub struct Journal {
    writer: Mutex<WalWriter>,
}

impl Journal {
    pub fn new(writer: WalWriter) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Append an encoded batch; with `sync` the call returns only after
    /// the log is on stable storage
    pub fn append(&self, payload: &[u8], sync: bool) -> Result<()> {
        self.writer.lock().append(payload, sync)
    }

    /// Sync the current log and make `next` current
    ///
    /// Returns the number of the retired log. On error the current log
    /// stays in place.
    pub fn switch(&self, next: WalWriter) -> Result<u64> {
        let mut writer = self.writer.lock();
        writer.sync()?;
        let retired = std::mem::replace(&mut *writer, next);
        Ok(retired.number())
    }

    pub fn sync(&self) -> Result<()> {
        self.writer.lock().sync()
    }

    /// True once a failed rollback left the current log unusable; only a
    /// `switch` clears it
    pub fn is_poisoned(&self) -> bool {
        self.writer.lock().is_poisoned()
    }

    /// Number of the current log
    pub fn number(&self) -> u64 {
        self.writer.lock().number()
    }
}
