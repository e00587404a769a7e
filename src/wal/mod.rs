//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append one frame per committed batch, in commit order
//! - CRC32 checksums for corruption detection
//! - Optional fsync per append (durable writes)
//! - Background appends for large batches (`WalWorker`)
//! - Crash recovery and replay into a memtable
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Frame 1                                 │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ CRC (4) │ Len (4) │ Batch payload   │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Frame 2                                 │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ CRC (4) │ Len (4) │ Batch payload   │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Logs are numbered from the same counter as tables and named
//! `{number:06}.log` inside the data directory. A log is retired when the
//! engine rotates its memtable and deleted once that memtable is flushed.

mod entry;
mod journal;
mod reader;
mod recovery;
mod worker;
mod writer;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use entry::{encode_frame, HEADER_SIZE};
pub use journal::Journal;
pub use reader::WalReader;
pub use recovery::{RecoveryResult, WalRecovery};
pub use worker::WalWorker;
pub use writer::{DiskLogStore, LogFile, LogStore, WalWriter};

/// Path of the log with the given number
pub fn log_path(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("{:06}.log", number))
}

/// Parse a log number from its file name
/// "000042.log" → Some(42)
pub fn parse_log_number(path: &Path) -> Option<u64> {
    if path.extension()? != "log" {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// All log files in `dir`, oldest first
pub fn list_logs(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let mut logs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(number) = parse_log_number(&path) {
            logs.push((number, path));
        }
    }
    logs.sort_by_key(|(number, _)| *number);
    Ok(logs)
}
