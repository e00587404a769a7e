//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::batch::{Batch, Record};

use super::{InternalKey, MemTableEntry};

/// Per-entry bookkeeping on top of key and value bytes (the sequence number)
const ENTRY_OVERHEAD: usize = 8;

fn entry_size(key: &[u8], entry: &MemTableEntry) -> usize {
    let value_len = match entry {
        MemTableEntry::Value(value) => value.len(),
        MemTableEntry::Tombstone => 0,
    };
    key.len() + value_len + ENTRY_OVERHEAD
}

/// In-memory table for recent writes
pub struct MemTable {
    data: RwLock<BTreeMap<InternalKey, MemTableEntry>>,

    /// Approximate size in bytes
    size: AtomicUsize,

    /// Log created together with this table
    log_number: u64,

    /// Highest committed sequence number
    max_sequence: AtomicU64,
}

impl MemTable {
    /// Create an empty table whose writes go to log `log_number`
    pub fn new(log_number: u64) -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
            log_number,
            max_sequence: AtomicU64::new(0),
        }
    }

    /// Stage every record of `batch` at its sequence number
    ///
    /// The records become permanent on `Replay::commit`; dropping the
    /// guard without committing removes them again. The batch must have a
    /// sequence number assigned.
    pub fn replay<'a>(&'a self, batch: &'a Batch) -> Replay<'a> {
        debug_assert!(batch.seq() > 0, "replay of a batch without a sequence number");

        let mut data = self.data.write();
        let mut added = 0;
        for (seq, record) in batch.iter() {
            let entry = match record {
                Record::Put { value, .. } => MemTableEntry::Value(value.clone()),
                Record::Delete { .. } => MemTableEntry::Tombstone,
            };
            added += entry_size(record.key(), &entry);
            data.insert(InternalKey::new(record.key().to_vec(), seq), entry);
        }
        self.size.fetch_add(added, Ordering::Relaxed);

        Replay {
            table: self,
            batch,
            committed: false,
        }
    }

    fn remove(&self, batch: &Batch) {
        let mut data = self.data.write();
        let mut removed = 0;
        for (seq, record) in batch.iter() {
            let key = InternalKey::new(record.key().to_vec(), seq);
            if let Some(entry) = data.remove(&key) {
                removed += entry_size(&key.user_key, &entry);
            }
        }
        self.size.fetch_sub(removed, Ordering::Relaxed);
    }

    /// Newest entry for `key` with a sequence number <= `snapshot`
    pub fn get(&self, key: &[u8], snapshot: u64) -> Option<MemTableEntry> {
        let data = self.data.read();
        let (found, entry) = data
            .range(InternalKey::new(key.to_vec(), snapshot)..)
            .next()?;
        (found.user_key == key).then(|| entry.clone())
    }

    /// Sorted copy of every entry (for flushing)
    pub fn entries(&self) -> Vec<(InternalKey, MemTableEntry)> {
        self.data
            .read()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn log_number(&self) -> u64 {
        self.log_number
    }

    pub fn max_sequence(&self) -> u64 {
        self.max_sequence.load(Ordering::Acquire)
    }
}

/// A batch applied to a memtable but not yet committed
#[must_use = "a replay is reverted when dropped without commit"]
pub struct Replay<'a> {
    table: &'a MemTable,
    batch: &'a Batch,
    committed: bool,
}

impl Replay<'_> {
    /// Keep the staged records
    pub fn commit(mut self) {
        self.committed = true;
        self.table
            .max_sequence
            .fetch_max(self.batch.last_seq(), Ordering::AcqRel);
    }

    /// Remove the staged records
    pub fn revert(self) {}
}

impl Drop for Replay<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.table.remove(self.batch);
        }
    }
}
