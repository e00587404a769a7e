//! Batch Module
//!
//! An ordered group of mutations committed atomically under one
//! contiguous range of sequence numbers.
//!
//! ## Responsibilities
//! - Own copies of every key and value (callers may reuse their buffers)
//! - Track the encoded size used for merge-window and log dispatch decisions
//! - Carry the durability flag and the first assigned sequence number
//! - Encode to / decode from the log payload format

mod codec;
mod record;

use bytes::Bytes;

use crate::error::Result;

pub use codec::BATCH_HEADER_SIZE;
pub use record::{Record, RecordKind, DELETE_OVERHEAD, PUT_OVERHEAD};

/// Ordered sequence of mutation records
///
/// `seq` is zero until the write coordinator assigns the batch its place in
/// the global order; record `i` then lives at `seq + i`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    records: Vec<Record>,
    size: usize,
    seq: u64,
    sync: bool,
}

impl Batch {
    /// Create a new empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put; key and value are copied
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.push(Record::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    /// Queue a delete; the key is copied
    pub fn delete(&mut self, key: &[u8]) {
        self.push(Record::Delete { key: key.to_vec() });
    }

    pub(crate) fn push(&mut self, record: Record) {
        self.size += record.encoded_size();
        self.records.push(record);
    }

    /// Move every record of `other` to the end of this batch
    ///
    /// Only valid before a sequence number is assigned. The merged batch is
    /// durable if either side was.
    pub fn append(&mut self, other: Batch) {
        debug_assert_eq!(self.seq, 0, "append after sequence assignment");
        self.size += other.size;
        self.sync |= other.sync;
        self.records.extend(other.records);
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Encoded size of the records (excludes the payload header)
    pub fn size(&self) -> usize {
        self.size
    }

    /// First sequence number, zero if unassigned
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Sequence number of the last record
    pub fn last_seq(&self) -> u64 {
        self.seq + self.records.len().saturating_sub(1) as u64
    }

    /// Whether the log must reach stable storage before acknowledging
    pub fn sync(&self) -> bool {
        self.sync
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Records paired with their sequence numbers
    pub fn iter(&self) -> impl Iterator<Item = (u64, &Record)> + '_ {
        (self.seq..).zip(self.records.iter())
    }

    /// Remove all records and reset the batch for reuse
    pub fn clear(&mut self) {
        self.records.clear();
        self.size = 0;
        self.seq = 0;
        self.sync = false;
    }

    /// Assign the first sequence number
    ///
    /// The write coordinator calls this exactly once per committed batch;
    /// recovery calls it for batches decoded from the log.
    pub fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }

    pub(crate) fn set_sync(&mut self, sync: bool) {
        self.sync = sync;
    }

    /// Encode as a log payload
    pub fn encode(&self) -> Result<Bytes> {
        codec::encode(self)
    }

    /// Decode a log payload
    pub fn decode(data: &[u8]) -> Result<Self> {
        codec::decode(data)
    }
}
