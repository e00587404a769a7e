//! Engine Module
//!
//! The write path of the store: admission, group commit, logging,
//! memtable application and flow control.
//!
//! ## Responsibilities
//! - Recover the memtable from leftover logs on open
//! - Serialize writers behind a single leader (see `write`)
//! - Keep the global sequence counter
//! - Throttle writers while compaction falls behind (see `gate`)
//! - Own the background log writer and the compaction worker

mod gate;
mod stats;
mod write;

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::compaction::{Compaction, Compactor};
use crate::config::Config;
use crate::error::{Result, TideError};
use crate::memtable::{MemTable, MemTableSet};
use crate::version::{Version, VersionSet};
use crate::wal::{
    self, DiskLogStore, Journal, LogStore, RecoveryResult, WalRecovery, WalWorker, WalWriter,
};

use stats::Stats;
use write::WriteQueue;

pub use stats::WriteStats;

/// The main storage engine (write side)
///
/// ## Concurrency Model: single leader, many followers
///
/// - **Writes**: any number of threads call `write`; one of them holds the
///   write token and commits on behalf of the others
/// - **Sequence counter**: advanced only by the token holder
/// - **Memtables / versions**: read-mostly, snapshot via `Arc`
/// - **Background**: one log-append thread, one compaction thread
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Active and frozen memtables
    mems: Arc<MemTableSet>,

    /// Table hierarchy snapshots and file numbers
    versions: Arc<VersionSet>,

    /// Current write-ahead log
    journal: Arc<Journal>,

    /// Where new logs are created
    log_store: Arc<dyn LogStore>,

    /// Appends large groups off the leader's thread
    wal_worker: WalWorker,

    /// Flushes frozen memtables and compacts tables
    compactor: Compactor,

    /// Write token and follower queue
    writers: WriteQueue,

    /// Sequence number of the last committed record
    last_sequence: AtomicU64,

    closed: AtomicBool,

    stats: Stats,

    /// What open replayed from leftover logs
    recovery: RecoveryResult,
}

/// Builder for an Engine and its collaborators
pub struct EngineBuilder {
    config: Config,
    compaction: Option<Arc<dyn Compaction>>,
    log_store: Arc<dyn LogStore>,
}

impl EngineBuilder {
    /// Set the table-level compaction implementation (required)
    pub fn compaction<C: Compaction>(mut self, compaction: Arc<C>) -> Self {
        self.compaction = Some(compaction as Arc<dyn Compaction>);
        self
    }

    /// Set where logs are created (defaults to plain files)
    pub fn log_store<S: LogStore + 'static>(mut self, store: Arc<S>) -> Self {
        self.log_store = store;
        self
    }

    /// Open or create the engine
    ///
    /// On startup:
    /// 1. Validate config and create the data directory
    /// 2. Load the version from the compaction collaborator
    /// 3. Replay leftover logs into a fresh memtable
    /// 4. Start a new log and the background threads
    pub fn open(self) -> Result<Engine> {
        let EngineBuilder {
            config,
            compaction,
            log_store,
        } = self;

        config.validate()?;
        let compaction = compaction.ok_or_else(|| {
            TideError::Config("no compaction implementation configured".to_string())
        })?;
        fs::create_dir_all(&config.data_dir)?;

        let versions = Arc::new(VersionSet::new(compaction.load_version()?));

        // Step 1: Replay leftover logs into the first memtable
        let logs = wal::list_logs(&config.data_dir)?;
        if let Some((newest, _)) = logs.last() {
            versions.mark_file_number_used(*newest);
        }
        let number = versions.new_file_number();
        let active = Arc::new(MemTable::new(number));
        let recovery = WalRecovery::recover(&logs, &active)?;

        if recovery.batches_recovered > 0 || recovery.entries_corrupted > 0 {
            tracing::info!(
                logs = recovery.logs_replayed.len(),
                batches = recovery.batches_recovered,
                records = recovery.records_recovered,
                corrupted = recovery.entries_corrupted,
                truncated = recovery.was_truncated,
                last_sequence = recovery.last_sequence,
                "WAL recovery"
            );
        }

        // Step 2: Start the log this session writes to
        let writer = WalWriter::create(log_store.as_ref(), &config.data_dir, number)?;
        let journal = Arc::new(Journal::new(writer));

        let last_sequence = recovery
            .last_sequence
            .max(versions.current().last_sequence());
        let mems = Arc::new(MemTableSet::new(active));

        // Step 3: Background threads
        let wal_worker = WalWorker::spawn(Arc::clone(&journal))?;
        let compactor = Compactor::spawn(
            compaction,
            Arc::clone(&mems),
            Arc::clone(&versions),
            config.data_dir.clone(),
        )?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            log = number,
            last_sequence,
            "Engine opened"
        );

        Ok(Engine {
            config,
            mems,
            versions,
            journal,
            log_store,
            wal_worker,
            compactor,
            writers: WriteQueue::new(),
            last_sequence: AtomicU64::new(last_sequence),
            closed: AtomicBool::new(false),
            stats: Stats::default(),
            recovery,
        })
    }
}

impl Engine {
    /// Start building an engine
    pub fn builder(config: Config) -> EngineBuilder {
        EngineBuilder {
            config,
            compaction: None,
            log_store: Arc::new(DiskLogStore),
        }
    }

    /// Open with plain log files (convenience method)
    pub fn open<C: Compaction>(config: Config, compaction: Arc<C>) -> Result<Self> {
        Self::builder(config).compaction(compaction).open()
    }

    /// Close the engine gracefully
    ///
    /// Waits for the current leader, stops the background threads and
    /// syncs the log. Later writes fail with `Closed`. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.writers.acquire()?;
        self.wal_worker.stop();
        self.compactor.stop();
        let synced = self.journal.sync();
        self.writers.release();

        tracing::info!(last_sequence = self.last_sequence(), "Engine closed");
        synced
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(TideError::Closed);
        }
        Ok(())
    }

    fn advance_sequence(&self, records: u64) {
        self.last_sequence.fetch_add(records, Ordering::AcqRel);
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Sequence number of the last committed record
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    /// Snapshot of (active, frozen) memtables
    pub fn memtables(&self) -> (Arc<MemTable>, Option<Arc<MemTable>>) {
        self.mems.get()
    }

    /// Acquire the current version
    pub fn current_version(&self) -> Arc<Version> {
        self.versions.current()
    }

    /// Number of the log currently written
    pub fn log_number(&self) -> u64 {
        self.journal.number()
    }

    /// Fatal error recorded by the compaction worker
    pub fn background_error(&self) -> Option<TideError> {
        self.compactor.background_error()
    }

    pub fn stats(&self) -> WriteStats {
        self.stats.snapshot()
    }

    /// What open replayed from leftover logs
    pub fn recovery(&self) -> &RecoveryResult {
        &self.recovery
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "Error while closing engine");
        }
    }
}
