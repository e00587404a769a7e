//! Shared helpers for integration tests
//!
//! - `TestCompaction`: in-memory stand-in for the table layer
//! - `FlakyLogStore`: log files whose writes fail on demand

#![allow(dead_code)]

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tempfile::TempDir;

use tidekv::config::ConfigBuilder;
use tidekv::memtable::{InternalKey, MemTable, MemTableEntry};
use tidekv::version::{TableMeta, Version, VersionEdit};
use tidekv::wal::{LogFile, LogStore};
use tidekv::{Compaction, Config, Engine, Result, TideError};

// =============================================================================
// Logging
// =============================================================================

/// Route engine logs to the test output (RUST_LOG=tidekv=debug)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Compaction Stand-in
// =============================================================================

/// Level-0 files left after a released stall
pub const LEVEL0_AFTER_COMPACTION: usize = 4;

/// Keeps flushed memtables in memory and fakes level-0 bookkeeping
pub struct TestCompaction {
    level0_at_open: usize,
    flushed: Mutex<Vec<(InternalKey, MemTableEntry)>>,
    flushes: AtomicUsize,
    fail_flush: AtomicBool,
    /// While set, the next compaction of a crowded level-0 blocks until a
    /// message arrives, then shrinks level-0
    release: Mutex<Option<Receiver<()>>>,
}

impl TestCompaction {
    pub fn new() -> Arc<Self> {
        Self::with_level0_files(0)
    }

    pub fn with_level0_files(count: usize) -> Arc<Self> {
        Arc::new(Self {
            level0_at_open: count,
            flushed: Mutex::new(Vec::new()),
            flushes: AtomicUsize::new(0),
            fail_flush: AtomicBool::new(false),
            release: Mutex::new(None),
        })
    }

    /// Start with `count` level-0 files; compaction waits for the sender
    pub fn stalled(count: usize) -> (Arc<Self>, Sender<()>) {
        let (release_tx, release_rx) = channel::bounded(1);
        let compaction = Self::with_level0_files(count);
        *compaction.release.lock() = Some(release_rx);
        (compaction, release_tx)
    }

    pub fn fail_flushes(&self) {
        self.fail_flush.store(true, Ordering::SeqCst);
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn flushed_entries(&self) -> Vec<(InternalKey, MemTableEntry)> {
        self.flushed.lock().clone()
    }
}

impl Compaction for TestCompaction {
    fn load_version(&self) -> Result<Version> {
        let mut edit = VersionEdit::new();
        for number in 1..=self.level0_at_open as u64 {
            edit = edit.add_table(0, table(number));
        }
        Version::new().apply(&edit)
    }

    fn flush_memtable(&self, frozen: &MemTable, number: u64) -> Result<TableMeta> {
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(TideError::Compaction("injected flush failure".to_string()));
        }
        let entries = frozen.entries();
        let mut meta = table(number);
        meta.size = frozen.size() as u64;
        if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
            meta.smallest = first.0.user_key.clone();
            meta.largest = last.0.user_key.clone();
        }
        self.flushed.lock().extend(entries);
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(meta)
    }

    fn compact(&self, version: &Version) -> Result<Option<VersionEdit>> {
        if version.level_files(0) <= LEVEL0_AFTER_COMPACTION {
            return Ok(None);
        }
        let Some(release) = self.release.lock().take() else {
            return Ok(None);
        };
        if release.recv_timeout(Duration::from_secs(10)).is_err() {
            return Err(TideError::Compaction("stall was never released".to_string()));
        }

        let mut edit = VersionEdit::new();
        for meta in version.tables(0).iter().skip(LEVEL0_AFTER_COMPACTION) {
            edit = edit.delete_table(0, meta.number);
        }
        Ok(Some(edit))
    }
}

fn table(number: u64) -> TableMeta {
    TableMeta {
        number,
        size: 0,
        smallest: Vec::new(),
        largest: Vec::new(),
    }
}

// =============================================================================
// Fault Injection
// =============================================================================

/// Creates log files whose writes fail while the shared flag is set
#[derive(Default)]
pub struct FlakyLogStore {
    fail: Arc<AtomicBool>,
    fail_truncate: Arc<AtomicBool>,
}

impl FlakyLogStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Make rollbacks fail too, which poisons the log
    pub fn set_failing_truncate(&self, failing: bool) {
        self.fail_truncate.store(failing, Ordering::SeqCst);
    }
}

impl LogStore for FlakyLogStore {
    fn create(&self, path: &Path) -> io::Result<Box<dyn LogFile>> {
        let file = FlakyLogFile::create(
            path,
            Arc::clone(&self.fail),
            Arc::clone(&self.fail_truncate),
        )?;
        Ok(Box::new(file))
    }
}

/// A log file that tears its frame and errors while `fail` is set
pub struct FlakyLogFile {
    file: File,
    fail: Arc<AtomicBool>,
    fail_truncate: Arc<AtomicBool>,
}

impl FlakyLogFile {
    pub fn create(
        path: &Path,
        fail: Arc<AtomicBool>,
        fail_truncate: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let file = OpenOptions::new().append(true).create_new(true).open(path)?;
        Ok(Self {
            file,
            fail,
            fail_truncate,
        })
    }
}

impl LogFile for FlakyLogFile {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            // Half a frame reaches the file, as with a short write
            Write::write_all(&mut self.file, &buf[..buf.len() / 2])?;
            return Err(io::Error::new(io::ErrorKind::Other, "injected log failure"));
        }
        Write::write_all(&mut self.file, buf)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        if self.fail_truncate.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected truncate failure"));
        }
        self.file.set_len(len)
    }
}

// =============================================================================
// Engine Helpers
// =============================================================================

pub fn config(dir: &Path) -> ConfigBuilder {
    Config::builder().data_dir(dir)
}

pub fn open_engine(config: Config, compaction: Arc<TestCompaction>) -> Engine {
    init_tracing();
    Engine::open(config, compaction).unwrap()
}

pub fn setup_temp_engine() -> (TempDir, Engine, Arc<TestCompaction>) {
    let temp_dir = TempDir::new().unwrap();
    let compaction = TestCompaction::new();
    let engine = open_engine(config(temp_dir.path()).build(), Arc::clone(&compaction));
    (temp_dir, engine, compaction)
}

/// Every (key, seq) held by the engine's memtables
pub fn memtable_sequences(engine: &Engine) -> Vec<(Vec<u8>, u64)> {
    let (active, frozen) = engine.memtables();
    let mut found: Vec<(Vec<u8>, u64)> = active
        .entries()
        .into_iter()
        .map(|(key, _)| (key.user_key, key.seq))
        .collect();
    if let Some(frozen) = frozen {
        found.extend(
            frozen
                .entries()
                .into_iter()
                .map(|(key, _)| (key.user_key, key.seq)),
        );
    }
    found
}

/// Newest visible entry for `key` in the engine's memtables
pub fn lookup(engine: &Engine, key: &[u8]) -> Option<MemTableEntry> {
    let snapshot = engine.last_sequence();
    let (active, frozen) = engine.memtables();
    active
        .get(key, snapshot)
        .or_else(|| frozen.and_then(|frozen| frozen.get(key, snapshot)))
}

/// Newest entry for `key`, also after its memtable was flushed
pub fn stored(engine: &Engine, compaction: &TestCompaction, key: &[u8]) -> Option<MemTableEntry> {
    // The frozen memtable is dropped only after its entries reach `flushed`
    lookup(engine, key).or_else(|| {
        compaction
            .flushed_entries()
            .into_iter()
            .filter(|(internal, _)| internal.user_key == key)
            .max_by_key(|(internal, _)| internal.seq)
            .map(|(_, entry)| entry)
    })
}

/// Poll `condition` until it holds or five seconds pass
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
