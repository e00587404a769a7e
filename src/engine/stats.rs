//! Write path counters

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub(crate) struct Stats {
    pub(crate) group_commits: AtomicU64,
    pub(crate) merged_writes: AtomicU64,
    pub(crate) promoted_writes: AtomicU64,
    pub(crate) write_delays: AtomicU64,
    pub(crate) write_stalls: AtomicU64,
    pub(crate) rotations: AtomicU64,
    pub(crate) async_log_writes: AtomicU64,
}

impl Stats {
    pub(crate) fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> WriteStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        WriteStats {
            group_commits: load(&self.group_commits),
            merged_writes: load(&self.merged_writes),
            promoted_writes: load(&self.promoted_writes),
            write_delays: load(&self.write_delays),
            write_stalls: load(&self.write_stalls),
            rotations: load(&self.rotations),
            async_log_writes: load(&self.async_log_writes),
        }
    }
}

/// Counters since the engine was opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Commit groups that reached the log
    pub group_commits: u64,

    /// Follower batches absorbed into a committed group
    pub merged_writes: u64,

    /// Followers handed the write token because they did not fit a
    /// committed group
    pub promoted_writes: u64,

    /// One-off slowdown sleeps
    pub write_delays: u64,

    /// Times a writer parked on the compactor
    pub write_stalls: u64,

    /// Memtable rotations
    pub rotations: u64,

    /// Groups appended through the background log writer
    pub async_log_writes: u64,
}
