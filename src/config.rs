//! Configuration for txlogkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, TxLogError};

/// Default capacity of the pending-write queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Default table name for the SQLite backend
pub const DEFAULT_TABLE_NAME: &str = "transactions";

/// Main configuration for a txlogkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Transaction Log Configuration
    // -------------------------------------------------------------------------
    /// Which backend holds the transaction log, and where
    pub backend: BackendConfig,

    /// Capacity of the bounded queue between producers and the writer
    pub queue_capacity: usize,

    /// Sync strategy: how often to fsync the file backend
    pub sync_strategy: SyncStrategy,

    /// What the writer does after a failed append
    pub write_failure_policy: WriteFailurePolicy,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,
}

/// Backend selection, tagged by kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Append-only text file, one record per line
    File { path: PathBuf },

    /// SQLite database holding one row per event
    Sqlite { path: PathBuf, table: String },
}

impl BackendConfig {
    /// Short name used in logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::File { .. } => "file",
            BackendConfig::Sqlite { .. } => "sqlite",
        }
    }
}

/// File backend sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every record (safest, slowest)
    EveryWrite,

    /// fsync after N records (balanced durability/performance)
    EveryNEntries { count: usize },
}

/// Behavior of the writer after an append fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteFailurePolicy {
    /// Report the failure once and stop writing for good
    #[default]
    Halt,

    /// Report every failure and keep consuming the queue
    Continue,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::File {
                path: PathBuf::from("./transaction.log"),
            },
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sync_strategy: SyncStrategy::EveryWrite,
            write_failure_policy: WriteFailurePolicy::Halt,
            listen_addr: "127.0.0.1:8080".to_string(),
            max_connections: 1024,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the settings that would otherwise fail deep inside a backend
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(TxLogError::Config(
                "queue capacity must be at least 1".to_string(),
            ));
        }

        if let SyncStrategy::EveryNEntries { count: 0 } = self.sync_strategy {
            return Err(TxLogError::Config(
                "sync batch size must be at least 1".to_string(),
            ));
        }

        if let BackendConfig::Sqlite { table, .. } = &self.backend {
            if !is_valid_table_name(table) {
                return Err(TxLogError::Config(format!(
                    "invalid table name: {:?}",
                    table
                )));
            }
        }

        Ok(())
    }
}

/// Table names are spliced into SQL, so only plain identifiers pass
pub(crate) fn is_valid_table_name(table: &str) -> bool {
    !table.is_empty()
        && !table.starts_with(|c: char| c.is_ascii_digit())
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Log to an append-only file
    pub fn file_backend(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.backend = BackendConfig::File { path: path.into() };
        self
    }

    /// Log to a table in a SQLite database
    pub fn sqlite_backend(mut self, path: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        self.config.backend = BackendConfig::Sqlite {
            path: path.into(),
            table: table.into(),
        };
        self
    }

    /// Set the pending-write queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the file sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the write failure policy
    pub fn write_failure_policy(mut self, policy: WriteFailurePolicy) -> Self {
        self.config.write_failure_policy = policy;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
