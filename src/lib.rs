//! # TideKV
//!
//! The write path of an embedded LSM key-value store:
//! - Group commit: one leader writes on behalf of concurrent callers
//! - Write-Ahead Logging (WAL) with per-write fsync
//! - Background log appends for large groups, overlapped with memtable replay
//! - Flow control against level-0 build-up (slowdown, stop, rotation)
//! - Crash recovery from leftover logs
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Callers (Engine::write/put/delete)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  leader / follower hand-off
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                Write Coordinator + Flow-Control Gate         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTable   │
//!   │ (+ worker)  │          │active/frozen│
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │ Compactor   │──► Compaction (embedder)
//!                           │ + Versions  │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod batch;
pub mod wal;
pub mod memtable;
pub mod version;
pub mod compaction;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use batch::{Batch, Record};
pub use compaction::Compaction;
pub use config::{Config, WriteOptions};
pub use engine::{Engine, EngineBuilder, WriteStats};
pub use error::{Result, TideError};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of TideKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
