//! Write coordination (group commit)
//!
//! Callers race for a single write token. The winner becomes the leader:
//! it commits its own batch plus whatever batches other callers hand it
//! while it holds the token. Everyone else is a follower and blocks until
//! the leader reports the shared outcome of the group.
//!
//! ```text
//!  caller ──┬── token free ────────────► leader: gate → merge → seq → log → memtable
//!           │                                                         │
//!           └── leader draining ──► follower ◄──── Ack::Committed ────┘
//! ```

use crossbeam::channel::{self, Receiver, Select, Sender};

use crate::batch::Batch;
use crate::config::WriteOptions;
use crate::error::{Result, TideError};

use super::stats::Stats;
use super::Engine;

/// Batches at or below this size may grow by the same amount again
pub(crate) const SMALL_GROUP_SIZE: usize = 128 << 10;

/// Ceiling for groups led by a batch above `SMALL_GROUP_SIZE`
pub(crate) const MAX_GROUP_SIZE: usize = 1 << 20;

/// Groups at least this large are logged by the background writer
pub(crate) const ASYNC_LOG_SIZE: usize = 128 << 10;

/// Largest size a group led by a batch of `size` bytes may reach
pub(crate) fn merge_ceiling(size: usize) -> usize {
    if size <= SMALL_GROUP_SIZE {
        size + SMALL_GROUP_SIZE
    } else {
        MAX_GROUP_SIZE
    }
}

/// A batch handed to the current leader
pub(crate) struct Follower {
    batch: Batch,
    ack: Sender<Ack>,
}

/// What a leader tells a follower it took from the queue
pub(crate) enum Ack {
    /// The follower's batch was part of a group with this outcome
    Committed(Result<()>),
    /// The batch did not fit the group; the write token now belongs to
    /// the follower, which leads the next group with it
    Promoted(Batch),
}

/// Write token and follower hand-off queue
pub(crate) struct WriteQueue {
    token_tx: Sender<()>,
    token_rx: Receiver<()>,
    queue_tx: Sender<Follower>,
    queue_rx: Receiver<Follower>,
}

impl WriteQueue {
    pub(crate) fn new() -> Self {
        let (token_tx, token_rx) = channel::bounded(1);
        // Zero capacity: a hand-off only completes while a leader drains
        let (queue_tx, queue_rx) = channel::bounded(0);
        Self {
            token_tx,
            token_rx,
            queue_tx,
            queue_rx,
        }
    }

    /// Block until the write token is ours
    pub(crate) fn acquire(&self) -> Result<()> {
        self.token_tx.send(()).map_err(|_| TideError::Closed)
    }

    pub(crate) fn release(&self) {
        let _ = self.token_rx.try_recv();
    }
}

/// Held by the leader for the lifetime of one group
///
/// Dropping it passes the token on (to a promoted follower, or back to the
/// pool) and then acknowledges every merged follower in merge order, also
/// when the leader unwinds.
struct Leadership<'a> {
    writers: &'a WriteQueue,
    merged: Vec<Sender<Ack>>,
    promoted: Option<Follower>,
    result: Option<Result<()>>,
}

impl<'a> Leadership<'a> {
    fn new(writers: &'a WriteQueue) -> Self {
        Self {
            writers,
            merged: Vec::new(),
            promoted: None,
            result: None,
        }
    }
}

impl Drop for Leadership<'_> {
    fn drop(&mut self) {
        let result = self.result.take().unwrap_or(Err(TideError::LeaderAborted));

        match self.promoted.take() {
            Some(next) => {
                if next.ack.send(Ack::Promoted(next.batch)).is_err() {
                    self.writers.release();
                }
            }
            None => self.writers.release(),
        }

        for ack in self.merged.drain(..) {
            // A follower only disappears if its thread died
            let _ = ack.send(Ack::Committed(result.clone()));
        }
    }
}

impl Engine {
    /// Apply `batch` atomically
    ///
    /// The batch's records get consecutive sequence numbers and are
    /// appended to the log before they become visible. With
    /// `options.sync` the log is on stable storage when this returns.
    /// An empty batch is a no-op.
    pub fn write(&self, mut batch: Batch, options: &WriteOptions) -> Result<()> {
        self.ensure_open()?;
        if batch.is_empty() {
            return Ok(());
        }
        // Only the caller's options count; a decoded batch may carry a
        // stale sequence number and flag
        batch.set_sync(options.sync);
        batch.set_seq(0);

        let (ack_tx, ack_rx) = channel::bounded(1);

        let mut select = Select::new();
        let follow = select.send(&self.writers.queue_tx);
        select.send(&self.writers.token_tx);
        let operation = select.select();

        if operation.index() == follow {
            operation
                .send(&self.writers.queue_tx, Follower { batch, ack: ack_tx })
                .map_err(|_| TideError::Closed)?;
            return match ack_rx.recv() {
                Ok(Ack::Committed(result)) => result,
                Ok(Ack::Promoted(batch)) => self.lead(batch),
                Err(_) => Err(TideError::LeaderAborted),
            };
        }

        operation
            .send(&self.writers.token_tx, ())
            .map_err(|_| TideError::Closed)?;
        self.lead(batch)
    }

    /// Put a key-value pair
    ///
    /// Key and value are copied; the caller may reuse them afterwards.
    pub fn put(&self, key: &[u8], value: &[u8], options: &WriteOptions) -> Result<()> {
        let mut batch = Batch::new();
        batch.put(key, value);
        self.write(batch, options)
    }

    /// Delete a key
    ///
    /// Writes a tombstone whether or not the key exists.
    pub fn delete(&self, key: &[u8], options: &WriteOptions) -> Result<()> {
        let mut batch = Batch::new();
        batch.delete(key);
        self.write(batch, options)
    }

    /// Run one group with the write token held
    fn lead(&self, batch: Batch) -> Result<()> {
        let mut leadership = Leadership::new(&self.writers);
        let result = self.commit_group(batch, &mut leadership);
        leadership.result = Some(result.clone());
        result
    }

    fn commit_group(&self, mut batch: Batch, leadership: &mut Leadership<'_>) -> Result<()> {
        self.ensure_open()?;
        let mem = self.make_room()?;

        // A durable group is never grown: its latency would include every
        // follower, and they did not ask for the fsync
        let ceiling = merge_ceiling(batch.size());
        while !batch.sync() && batch.size() <= ceiling {
            let Ok(follower) = self.writers.queue_rx.try_recv() else {
                break;
            };
            if batch.size() + follower.batch.size() > ceiling {
                leadership.promoted = Some(follower);
                break;
            }
            batch.append(follower.batch);
            leadership.merged.push(follower.ack);
        }

        let merged = leadership.merged.len() as u64;

        batch.set_seq(self.last_sequence() + 1);
        let payload = batch.encode()?;

        if batch.size() >= ASYNC_LOG_SIZE {
            self.wal_worker.submit(payload, batch.sync())?;
            let staged = mem.replay(&batch);
            if let Err(err) = self.wal_worker.wait() {
                staged.revert();
                tracing::warn!(seq = batch.seq(), error = %err, "Log append failed, reverted memtable");
                return Err(err);
            }
            staged.commit();
            Stats::bump(&self.stats.async_log_writes, 1);
        } else {
            if let Err(err) = self.journal.append(&payload, batch.sync()) {
                tracing::warn!(seq = batch.seq(), error = %err, "Log append failed");
                return Err(err);
            }
            mem.replay(&batch).commit();
        }

        self.advance_sequence(batch.len() as u64);
        Stats::bump(&self.stats.group_commits, 1);
        Stats::bump(&self.stats.merged_writes, merged);
        if leadership.promoted.is_some() {
            Stats::bump(&self.stats.promoted_writes, 1);
        }
        tracing::trace!(
            seq = batch.seq(),
            records = batch.len(),
            size = batch.size(),
            merged,
            sync = batch.sync(),
            "Committed write group"
        );
        Ok(())
    }
}
