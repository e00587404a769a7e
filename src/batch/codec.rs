//! Batch codec
//!
//! Log payload for one batch:
//! ```text
//! ┌──────────┬────────────────┬──────────────────────────────┐
//! │ Seq (8)  │ Count (8)      │ Records (bincode, in order)  │
//! └──────────┴────────────────┴──────────────────────────────┘
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::{Batch, Record};

/// First sequence number + record count prefix
pub const BATCH_HEADER_SIZE: usize = 8 + 8;

#[derive(Serialize)]
struct PayloadRef<'a> {
    seq: u64,
    records: &'a [Record],
}

#[derive(Deserialize)]
struct Payload {
    seq: u64,
    records: Vec<Record>,
}

pub(crate) fn encode(batch: &Batch) -> Result<Bytes> {
    let buf = bincode::serialize(&PayloadRef {
        seq: batch.seq(),
        records: batch.records(),
    })?;
    Ok(Bytes::from(buf))
}

pub(crate) fn decode(data: &[u8]) -> Result<Batch> {
    let payload: Payload = bincode::deserialize(data)?;
    let mut batch = Batch::new();
    for record in payload.records {
        batch.push(record);
    }
    batch.set_seq(payload.seq);
    Ok(batch)
}
