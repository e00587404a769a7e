//! Background log appends
//!
//! Large batches are appended by a dedicated thread so the leader can
//! replay the batch into the memtable while the log write is in flight.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{Result, TideError};

use super::Journal;

struct LogJob {
    payload: Bytes,
    sync: bool,
}

/// Dedicated log-append thread
///
/// Jobs are appended and acknowledged strictly in submission order; the
/// log position of a batch is its commit order. `None` on the job channel
/// stops the thread, which drops both channel ends on exit.
pub struct WalWorker {
    submit: Sender<Option<LogJob>>,
    ack: Receiver<Result<()>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WalWorker {
    pub fn spawn(journal: Arc<Journal>) -> Result<Self> {
        let (submit, jobs) = channel::bounded(1);
        let (acks, ack) = channel::bounded(1);

        let handle = thread::Builder::new()
            .name("wal-writer".to_string())
            .spawn(move || run(journal, jobs, acks))?;

        Ok(Self {
            submit,
            ack,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue an encoded batch for appending
    pub fn submit(&self, payload: Bytes, sync: bool) -> Result<()> {
        self.submit
            .send(Some(LogJob { payload, sync }))
            .map_err(|_| TideError::Closed)
    }

    /// Wait for the result of the oldest unacknowledged job
    pub fn wait(&self) -> Result<()> {
        self.ack.recv().map_err(|_| TideError::Closed)?
    }

    /// Stop the thread once every submitted job is done
    pub fn stop(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        // Fails only if the thread already exited
        let _ = self.submit.send(None);
        if handle.join().is_err() {
            tracing::error!("WAL writer thread panicked");
        }
    }
}

fn run(journal: Arc<Journal>, jobs: Receiver<Option<LogJob>>, acks: Sender<Result<()>>) {
    for job in jobs.iter() {
        let Some(job) = job else {
            break;
        };
        let result = journal.append(&job.payload, job.sync);
        if acks.send(result).is_err() {
            break;
        }
    }
    tracing::debug!("WAL writer stopped");
}
