//! Write flow control
//!
//! Before a leader writes it needs a memtable with room. Depending on
//! level-0 pressure and the memtable pair, it may first be delayed, park
//! on the compactor, or rotate the memtable.

use std::sync::Arc;
use std::thread;

use crate::config::Config;
use crate::error::Result;
use crate::memtable::MemTable;
use crate::wal::WalWriter;

use super::stats::Stats;
use super::Engine;

/// What the engine looks like to the gate on one iteration
#[derive(Debug, Clone, Copy)]
pub(crate) struct Pressure {
    pub(crate) level0_files: usize,
    pub(crate) active_size: usize,
    pub(crate) has_frozen: bool,
    /// The current log refuses appends until it is replaced
    pub(crate) log_poisoned: bool,
}

/// Gate decision for one iteration, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GateStep {
    /// Level-0 is filling up: sleep once, then re-evaluate
    Slowdown,
    /// Active memtable is within budget: write into it
    RoomAvailable,
    /// Active memtable is full (or its log is poisoned) and the previous
    /// one is not flushed yet
    FrozenPending,
    /// Level-0 is at its hard limit
    StopTier,
    /// Freeze the active memtable and start a new one
    Rotate,
}

impl GateStep {
    pub(crate) fn classify(pressure: &Pressure, config: &Config, delayed: bool) -> Self {
        if pressure.level0_files >= config.l0_slowdown_writes_trigger && !delayed {
            GateStep::Slowdown
        } else if pressure.active_size <= config.write_buffer_size && !pressure.log_poisoned {
            GateStep::RoomAvailable
        } else if pressure.has_frozen {
            GateStep::FrozenPending
        } else if pressure.level0_files >= config.l0_stop_writes_trigger {
            GateStep::StopTier
        } else {
            GateStep::Rotate
        }
    }
}

impl Engine {
    /// Return a memtable the leader may write into
    ///
    /// Called with the write token held. Sleeps at most once per call;
    /// blocking beyond that happens inside the compactor signals.
    pub(crate) fn make_room(&self) -> Result<Arc<MemTable>> {
        let mut delayed = false;
        let mut waited = false;

        loop {
            self.ensure_open()?;

            let version = self.versions.current();
            let (active, frozen) = self.mems.get();
            let pressure = Pressure {
                level0_files: version.level_files(0),
                active_size: active.size(),
                has_frozen: frozen.is_some(),
                log_poisoned: self.journal.is_poisoned(),
            };
            drop(frozen);
            drop(version);

            match GateStep::classify(&pressure, &self.config, delayed) {
                GateStep::Slowdown => {
                    delayed = true;
                    Stats::bump(&self.stats.write_delays, 1);
                    tracing::debug!(
                        level0_files = pressure.level0_files,
                        "Delaying write to let compaction catch up"
                    );
                    thread::sleep(self.config.slowdown_delay);
                }
                GateStep::RoomAvailable => return Ok(active),
                GateStep::FrozenPending => {
                    if waited {
                        if let Some(err) = self.compactor.background_error() {
                            return Err(err);
                        }
                        Stats::bump(&self.stats.write_stalls, 1);
                        self.compactor.schedule()?;
                    } else {
                        waited = true;
                        self.compactor.wait()?;
                    }
                }
                GateStep::StopTier => {
                    // Nothing will lower level-0 once compaction has failed
                    if let Some(err) = self.compactor.background_error() {
                        return Err(err);
                    }
                    Stats::bump(&self.stats.write_stalls, 1);
                    tracing::debug!(
                        level0_files = pressure.level0_files,
                        "Too many level-0 files, waiting for compaction"
                    );
                    self.compactor.schedule()?;
                }
                GateStep::Rotate => {
                    if pressure.log_poisoned {
                        tracing::warn!(
                            log = self.journal.number(),
                            "Current log is poisoned, rotating to a fresh one"
                        );
                    }
                    let active = self.rotate_memtable()?;
                    self.compactor.nudge();
                    return Ok(active);
                }
            }
        }
    }

    /// New log + new active memtable; the old memtable becomes frozen
    fn rotate_memtable(&self) -> Result<Arc<MemTable>> {
        let number = self.versions.new_file_number();
        let writer = WalWriter::create(self.log_store.as_ref(), &self.config.data_dir, number)?;
        let retired = self.journal.switch(writer)?;

        let active = Arc::new(MemTable::new(number));
        let frozen = self.mems.rotate(Arc::clone(&active));
        Stats::bump(&self.stats.rotations, 1);

        tracing::info!(
            log = number,
            retired_log = retired,
            frozen_size = frozen.size(),
            "Rotated memtable"
        );
        Ok(active)
    }
}
