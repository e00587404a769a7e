//! Mutation records
//!
//! A record is the unit a batch is made of. Its serde shape is the log
//! payload shape, so the size estimate below is exact for the bincode
//! encoding (u32 variant tag, u64 length prefixes).

use serde::{Deserialize, Serialize};

/// Variant tag + key length prefix + value length prefix
pub const PUT_OVERHEAD: usize = 4 + 8 + 8;

/// Variant tag + key length prefix
pub const DELETE_OVERHEAD: usize = 4 + 8;

/// Kind of a mutation, as stored next to a key in the memtable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Put,
    Delete,
}

/// A single mutation inside a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Put { .. } => RecordKind::Put,
            Record::Delete { .. } => RecordKind::Delete,
        }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            Record::Put { key, .. } | Record::Delete { key } => key,
        }
    }

    /// The value of a put, `None` for a delete
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Record::Put { value, .. } => Some(value),
            Record::Delete { .. } => None,
        }
    }

    /// Encoded size of this record in a log payload
    pub fn encoded_size(&self) -> usize {
        match self {
            Record::Put { key, value } => PUT_OVERHEAD + key.len() + value.len(),
            Record::Delete { key } => DELETE_OVERHEAD + key.len(),
        }
    }
}
