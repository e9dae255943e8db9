//! # txlogkv
//!
//! A networked key-value store made durable by a transaction log:
//! - Every Put/Delete is queued to an append-only log (file or SQLite)
//! - A single writer thread per log serializes all physical writes
//! - At startup the log is replayed in sequence order to rebuild the store
//! - TCP-based client protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │                  (thread per client)                         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Service                                 │
//! │        (mutate Store, then notify the logger)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────────┐
//!   │    Store    │          │ TransactionLog  │
//!   │  (RwLock)   │          │ (bounded queue) │
//!   └──────▲──────┘          └────────┬────────┘
//!          │                          ▼
//!          │  replay at       ┌─────────────────┐
//!          └──startup─────────│  File | SQLite  │
//!                             └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod txlog;
pub mod store;
pub mod network;
pub mod protocol;
pub mod service;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{TxLogError, Result};
pub use config::Config;
pub use service::Service;
pub use store::Store;
pub use txlog::{open_logger, recover, Event, EventType, TransactionLogger};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of txlogkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
