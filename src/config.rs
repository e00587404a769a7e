//! Configuration for TideKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, TideError};

/// Main configuration for a TideKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── 000003.log       (current write-ahead log)
    ///     └── 000001.log       (older logs, kept until their memtable is flushed)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Size budget of the active memtable (in bytes). Once exceeded the
    /// next write rotates it into the frozen slot.
    pub write_buffer_size: usize,

    // -------------------------------------------------------------------------
    // Flow Control Configuration
    // -------------------------------------------------------------------------
    /// Level-0 file count at which each write is delayed once
    pub l0_slowdown_writes_trigger: usize,

    /// Level-0 file count at which writes stop until compaction catches up
    pub l0_stop_writes_trigger: usize,

    /// How long a slowed-down write sleeps
    pub slowdown_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tidekv_data"),
            write_buffer_size: 4 * 1024 * 1024, // 4 MB
            l0_slowdown_writes_trigger: 8,
            l0_stop_writes_trigger: 12,
            slowdown_delay: Duration::from_millis(1),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the flow-control gate cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.write_buffer_size == 0 {
            return Err(TideError::Config(
                "write_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.l0_stop_writes_trigger < self.l0_slowdown_writes_trigger {
            return Err(TideError::Config(format!(
                "l0_stop_writes_trigger ({}) is below l0_slowdown_writes_trigger ({})",
                self.l0_stop_writes_trigger, self.l0_slowdown_writes_trigger
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the active memtable budget (in bytes)
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.config.write_buffer_size = size;
        self
    }

    /// Set the level-0 file count that triggers write slowdown
    pub fn l0_slowdown_writes_trigger(mut self, count: usize) -> Self {
        self.config.l0_slowdown_writes_trigger = count;
        self
    }

    /// Set the level-0 file count that stops writes
    pub fn l0_stop_writes_trigger(mut self, count: usize) -> Self {
        self.config.l0_stop_writes_trigger = count;
        self
    }

    /// Set the slowdown sleep
    pub fn slowdown_delay(mut self, delay: Duration) -> Self {
        self.config.slowdown_delay = delay;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Per-write options
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Force the log onto stable storage before the write is acknowledged
    pub sync: bool,
}

impl WriteOptions {
    /// Options for a durable (fsync'd) write
    pub fn sync() -> Self {
        Self { sync: true }
    }
}
