//! Error types for txlogkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using TxLogError
pub type Result<T> = std::result::Result<T, TxLogError>;

/// Unified error type for txlogkv operations
#[derive(Debug, Error)]
pub enum TxLogError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // -------------------------------------------------------------------------
    // Construction Errors
    // -------------------------------------------------------------------------
    #[error("cannot open {backend} transaction log: {source}")]
    BackendOpen {
        backend: &'static str,
        #[source]
        source: Box<TxLogError>,
    },

    #[error("failed to bootstrap transaction table: {0}")]
    SchemaBootstrap(String),

    // -------------------------------------------------------------------------
    // Replay Errors
    // -------------------------------------------------------------------------
    #[error("input parse error on record {line}: {reason}")]
    RecordParse { line: u64, reason: String },

    #[error("transaction numbers out of sequence: {found} does not follow {previous}")]
    OutOfSequence { previous: u64, found: u64 },

    #[error("transaction log replay is unavailable: {0}")]
    ReplayUnavailable(String),

    // -------------------------------------------------------------------------
    // Write Errors
    // -------------------------------------------------------------------------
    #[error("transaction log write failed for sequence {sequence}: {reason}")]
    WriteFailed { sequence: u64, reason: String },

    // -------------------------------------------------------------------------
    // Service Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TxLogError {
    /// Wrap a construction-time failure with the backend it came from
    pub(crate) fn backend_open(backend: &'static str, source: TxLogError) -> Self {
        TxLogError::BackendOpen {
            backend,
            source: Box::new(source),
        }
    }

    /// True for errors that mean the replayed log cannot be trusted
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            TxLogError::RecordParse { .. } | TxLogError::OutOfSequence { .. }
        )
    }
}
