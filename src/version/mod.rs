//! Version Module
//!
//! Immutable snapshots of the table hierarchy.
//!
//! The write path only reads the level-0 file count from a snapshot; the
//! compactor installs new snapshots as tables are added and merged. A
//! snapshot is acquired by cloning its `Arc` and released by dropping it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, TideError};

/// Number of levels in the hierarchy
pub const NUM_LEVELS: usize = 7;

/// Metadata of one table file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    pub number: u64,
    pub size: u64,
    pub smallest: Vec<u8>,
    pub largest: Vec<u8>,
}

/// Snapshot of the files in each level
#[derive(Debug, Clone, Default)]
pub struct Version {
    levels: [Vec<TableMeta>; NUM_LEVELS],
    last_sequence: u64,
}

impl Version {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tables in `level`
    pub fn level_files(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, Vec::len)
    }

    pub fn tables(&self, level: usize) -> &[TableMeta] {
        match self.levels.get(level) {
            Some(tables) => tables,
            None => &[],
        }
    }

    /// Highest sequence number persisted in tables
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Highest table number referenced
    pub fn max_table_number(&self) -> u64 {
        self.levels
            .iter()
            .flatten()
            .map(|table| table.number)
            .max()
            .unwrap_or(0)
    }

    /// A new version with `edit` applied on top of this one
    pub fn apply(&self, edit: &VersionEdit) -> Result<Version> {
        let mut next = self.clone();

        for (level, number) in &edit.deleted {
            let tables = next.level_mut(*level)?;
            tables.retain(|table| table.number != *number);
        }
        for (level, table) in &edit.added {
            next.level_mut(*level)?.push(table.clone());
        }
        if let Some(seq) = edit.last_sequence {
            next.last_sequence = next.last_sequence.max(seq);
        }
        Ok(next)
    }

    fn level_mut(&mut self, level: usize) -> Result<&mut Vec<TableMeta>> {
        self.levels
            .get_mut(level)
            .ok_or_else(|| TideError::Compaction(format!("level {} out of range", level)))
    }
}

/// Changes from one version to the next
#[derive(Debug, Clone, Default)]
pub struct VersionEdit {
    pub added: Vec<(usize, TableMeta)>,
    pub deleted: Vec<(usize, u64)>,
    pub last_sequence: Option<u64>,
}

impl VersionEdit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(mut self, level: usize, table: TableMeta) -> Self {
        self.added.push((level, table));
        self
    }

    pub fn delete_table(mut self, level: usize, number: u64) -> Self {
        self.deleted.push((level, number));
        self
    }

    pub fn last_sequence(mut self, seq: u64) -> Self {
        self.last_sequence = Some(seq);
        self
    }
}

/// The current version plus the file number allocator
///
/// Logs and tables draw numbers from the same counter.
pub struct VersionSet {
    current: RwLock<Arc<Version>>,
    next_file_number: AtomicU64,
}

impl VersionSet {
    pub fn new(version: Version) -> Self {
        let next = version.max_table_number() + 1;
        Self {
            current: RwLock::new(Arc::new(version)),
            next_file_number: AtomicU64::new(next),
        }
    }

    /// Acquire the current version
    pub fn current(&self) -> Arc<Version> {
        Arc::clone(&*self.current.read())
    }

    /// Install the result of `edit` as the current version
    pub fn apply(&self, edit: &VersionEdit) -> Result<Arc<Version>> {
        let mut current = self.current.write();
        let next = Arc::new(current.apply(edit)?);
        *current = Arc::clone(&next);
        Ok(next)
    }

    /// Allocate a file number
    pub fn new_file_number(&self) -> u64 {
        self.next_file_number.fetch_add(1, Ordering::SeqCst)
    }

    /// Make sure `number` is never handed out again
    pub fn mark_file_number_used(&self, number: u64) {
        self.next_file_number.fetch_max(number + 1, Ordering::SeqCst);
    }
}
