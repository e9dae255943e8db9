//! Transaction Log Module
//!
//! Durably records every mutation of the store before it is considered
//! committed, and rebuilds the store by replaying the log at startup.
//!
//! ## Responsibilities
//! - Accept Put/Delete notifications without blocking request handlers
//!   (except when the bounded queue is full)
//! - Serialize all physical writes through one writer thread per logger
//! - Assign strictly increasing sequence numbers in the log store
//! - Replay history once, in sequence order, rejecting reordered logs
//!
//! ## Lifecycle
//! ```text
//! Constructed ──read_events()──► Replaying ──► Replayed ──run()──► Running ──close()──► Closed
//!      │                              │
//!      └────────────run()─────────────┼────────────────────────────► Running
//!                                     └──► ReplayFailed (terminal)
//! ```
//!
//! ## Durability Contract
//! `write_put`/`write_delete` return once the event is queued, not once it
//! is on disk. A crash between enqueue and append loses that event.
//! `close()` drains the queue and syncs the backend before returning.

mod event;
mod file;
mod pipeline;
mod record;
mod recovery;
mod replay;
mod sqlite;

use std::sync::Arc;

use crossbeam::channel::Receiver;

use crate::config::{BackendConfig, Config, SyncStrategy, WriteFailurePolicy, DEFAULT_QUEUE_CAPACITY};
use crate::error::Result;
use crate::TxLogError;

pub use event::{Event, EventType};
pub use file::FileTransactionLogger;
pub use pipeline::LoggerState;
pub use record::{decode_record, encode_record};
pub use recovery::{recover, spawn_error_drain, RecoveryStats};
pub use sqlite::SqliteTransactionLogger;

/// A durable, ordered log of store mutations
///
/// All methods take `&self` so one logger can be shared by every request
/// handler behind an `Arc`.
pub trait TransactionLogger: Send + Sync {
    /// Queue a Put event. Blocks only while the queue is full.
    fn write_put(&self, key: &str, value: &str);

    /// Queue a Delete event. Blocks only while the queue is full.
    fn write_delete(&self, key: &str);

    /// Stream of asynchronous write failures, one per failed append
    fn err(&self) -> Receiver<TxLogError>;

    /// Replay the full history in sequence order
    ///
    /// The event stream closes when the log is exhausted or right after
    /// the single error reported on the second stream. Only valid once,
    /// before `run()`.
    fn read_events(&self) -> (Receiver<Event>, Receiver<TxLogError>);

    /// Start the writer thread
    fn run(&self) -> Result<()>;

    /// Stop accepting writes, drain the queue, sync and join the writer
    fn close(&self) -> Result<()>;

    /// Current lifecycle state
    fn state(&self) -> LoggerState;

    /// Highest sequence number replayed or written so far
    fn last_sequence(&self) -> u64;
}

/// Tuning shared by every backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggerOptions {
    pub queue_capacity: usize,
    pub sync_strategy: SyncStrategy,
    pub write_failure_policy: WriteFailurePolicy,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sync_strategy: SyncStrategy::EveryWrite,
            write_failure_policy: WriteFailurePolicy::Halt,
        }
    }
}

impl From<&Config> for LoggerOptions {
    fn from(config: &Config) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            sync_strategy: config.sync_strategy,
            write_failure_policy: config.write_failure_policy,
        }
    }
}

/// Open the logger selected by `config.backend`
pub fn open_logger(config: &Config) -> Result<Arc<dyn TransactionLogger>> {
    config.validate()?;
    let options = LoggerOptions::from(config);

    tracing::info!(
        backend = config.backend.kind(),
        queue_capacity = options.queue_capacity,
        "opening transaction logger"
    );

    let logger: Arc<dyn TransactionLogger> = match &config.backend {
        BackendConfig::File { path } => Arc::new(FileTransactionLogger::open(path, options)?),
        BackendConfig::Sqlite { path, table } => {
            Arc::new(SqliteTransactionLogger::open(path, table, options)?)
        }
    };

    Ok(logger)
}
