//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Hold every committed mutation not yet flushed to a table
//! - Apply batches in record order at their assigned sequence numbers
//! - Stage speculative replays that can be reverted exactly
//! - Track size for the flow-control gate
//! - Keep the active/frozen pair the engine rotates between
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock, keyed by (user key ascending, sequence
//! descending). Every record gets its own entry, so reverting a batch
//! removes exactly the keys it staged even if later batches touched the
//! same user keys.

mod set;
mod table;

use std::cmp::Ordering;

pub use set::MemTableSet;
pub use table::{MemTable, Replay};

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemTableEntry {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}

/// User key plus the sequence number of the mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalKey {
    pub user_key: Vec<u8>,
    pub seq: u64,
}

impl InternalKey {
    pub fn new(user_key: Vec<u8>, seq: u64) -> Self {
        Self { user_key, seq }
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.user_key
            .cmp(&other.user_key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
