//! Compaction Module
//!
//! Background worker that turns frozen memtables into level-0 tables and
//! runs table compactions, plus the signals the write path uses to wait
//! on it.
//!
//! ## Responsibilities
//! - Serialize compaction rounds on one thread
//! - `wait`: park until the worker is between rounds
//! - `schedule`: request a round and park until it finishes
//! - `nudge`: request a round without blocking
//! - Record the first fatal error; later rounds are skipped
//!
//! Building table files and choosing what to merge is the job of the
//! embedder's [`Compaction`] implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::error::{Result, TideError};
use crate::memtable::{MemTable, MemTableSet};
use crate::version::{TableMeta, Version, VersionEdit, VersionSet};
use crate::wal;

/// Table-level work the compactor delegates to the embedder
pub trait Compaction: Send + Sync + 'static {
    /// Version to start from when the engine opens
    fn load_version(&self) -> Result<Version> {
        Ok(Version::new())
    }

    /// Persist a frozen memtable as table `number`
    fn flush_memtable(&self, frozen: &MemTable, number: u64) -> Result<TableMeta>;

    /// Merge tables if `version` needs it
    fn compact(&self, version: &Version) -> Result<Option<VersionEdit>>;
}

enum Signal {
    Wait(Sender<()>),
    Schedule(Sender<()>),
    Nudge,
}

/// Handle to the compaction thread
pub struct Compactor {
    signals: Mutex<Option<Sender<Signal>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    error: Arc<RwLock<Option<TideError>>>,
}

impl Compactor {
    pub fn spawn(
        compaction: Arc<dyn Compaction>,
        mems: Arc<MemTableSet>,
        versions: Arc<VersionSet>,
        data_dir: PathBuf,
    ) -> Result<Self> {
        // One slot: nudges coalesce while a request is already pending
        let (signals, inbox) = channel::bounded(1);
        let error = Arc::new(RwLock::new(None));

        let worker = Worker {
            compaction,
            mems,
            versions,
            data_dir,
            error: Arc::clone(&error),
        };
        let handle = thread::Builder::new()
            .name("compaction".to_string())
            .spawn(move || worker.run(inbox))?;

        Ok(Self {
            signals: Mutex::new(Some(signals)),
            handle: Mutex::new(Some(handle)),
            error,
        })
    }

    /// Park until the round in progress, if any, is over
    pub fn wait(&self) -> Result<()> {
        let (done, finished) = channel::bounded(1);
        self.send(Signal::Wait(done))?;
        finished.recv().map_err(|_| TideError::Closed)
    }

    /// Request a round and park until it has run
    pub fn schedule(&self) -> Result<()> {
        let (done, finished) = channel::bounded(1);
        self.send(Signal::Schedule(done))?;
        finished.recv().map_err(|_| TideError::Closed)
    }

    /// Request a round without blocking; false if one is already queued
    pub fn nudge(&self) -> bool {
        match self.signals.lock().as_ref() {
            Some(signals) => signals.try_send(Signal::Nudge).is_ok(),
            None => false,
        }
    }

    /// The sticky error of a failed round
    pub fn background_error(&self) -> Option<TideError> {
        self.error.read().clone()
    }

    /// Stop the thread after the current round
    pub fn stop(&self) {
        drop(self.signals.lock().take());
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::error!("Compaction thread panicked");
            }
        }
    }

    fn send(&self, signal: Signal) -> Result<()> {
        // Clone so a blocked send does not hold the lock `stop` needs
        let signals = self.signals.lock().clone().ok_or(TideError::Closed)?;
        signals.send(signal).map_err(|_| TideError::Closed)
    }
}

struct Worker {
    compaction: Arc<dyn Compaction>,
    mems: Arc<MemTableSet>,
    versions: Arc<VersionSet>,
    data_dir: PathBuf,
    error: Arc<RwLock<Option<TideError>>>,
}

impl Worker {
    fn run(self, inbox: Receiver<Signal>) {
        for signal in inbox.iter() {
            match signal {
                Signal::Wait(done) => {
                    let _ = done.send(());
                }
                Signal::Schedule(done) => {
                    self.round();
                    let _ = done.send(());
                }
                Signal::Nudge => self.round(),
            }
        }
        tracing::debug!("Compaction worker stopped");
    }

    fn round(&self) {
        if self.error.read().is_some() {
            return;
        }
        if let Err(err) = self.try_round() {
            tracing::error!(error = %err, "Compaction failed, further rounds disabled");
            *self.error.write() = Some(err);
        }
    }

    fn try_round(&self) -> Result<()> {
        if let Some(frozen) = self.mems.frozen() {
            self.flush_frozen(&frozen)?;
        }

        let version = self.versions.current();
        if let Some(edit) = self.compaction.compact(&version)? {
            drop(version);
            let next = self.versions.apply(&edit)?;
            tracing::info!(
                level0_files = next.level_files(0),
                added = edit.added.len(),
                deleted = edit.deleted.len(),
                "Installed compaction result"
            );
        }
        Ok(())
    }

    fn flush_frozen(&self, frozen: &MemTable) -> Result<()> {
        if !frozen.is_empty() {
            let number = self.versions.new_file_number();
            let table = self.compaction.flush_memtable(frozen, number)?;
            let edit = VersionEdit::new()
                .add_table(0, table)
                .last_sequence(frozen.max_sequence());
            let next = self.versions.apply(&edit)?;
            tracing::info!(
                table = number,
                entries = frozen.entry_count(),
                level0_files = next.level_files(0),
                "Flushed frozen memtable"
            );
        }

        // Everything older than the active table's log is now in tables
        let live_log = self.mems.active().log_number();
        self.mems.drop_frozen();
        self.remove_obsolete_logs(live_log);
        Ok(())
    }

    fn remove_obsolete_logs(&self, live_log: u64) {
        let logs = match wal::list_logs(&self.data_dir) {
            Ok(logs) => logs,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to list logs");
                return;
            }
        };
        for (number, path) in logs.into_iter().filter(|(number, _)| *number < live_log) {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(log = number, "Removed obsolete log"),
                Err(err) => tracing::warn!(log = number, error = %err, "Failed to remove log"),
            }
        }
    }
}
