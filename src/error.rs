//! Error types for TideKV
//!
//! Provides a unified error type for all operations.
//!
//! Errors are `Clone`: a leader hands the exact same outcome to every
//! follower merged into its commit group.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Result type alias using TideError
pub type Result<T> = std::result::Result<T, TideError>;

/// Unified error type for TideKV operations
#[derive(Debug, Clone, Error)]
pub enum TideError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(Arc<io::Error>),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("WAL write failed: {0}")]
    WalWrite(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Background Errors
    // -------------------------------------------------------------------------
    /// Fatal error recorded by the compaction worker. Sticky: once set,
    /// writers waiting on a frozen memtable receive it.
    #[error("Compaction error: {0}")]
    Compaction(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Engine is closed")]
    Closed,

    /// The leader of a commit group unwound before reporting a result.
    #[error("Write leader aborted before completing the commit group")]
    LeaderAborted,
}

impl From<io::Error> for TideError {
    fn from(err: io::Error) -> Self {
        TideError::Io(Arc::new(err))
    }
}

impl From<bincode::Error> for TideError {
    fn from(err: bincode::Error) -> Self {
        TideError::Serialization(err.to_string())
    }
}
