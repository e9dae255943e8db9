//! Service Module
//!
//! Request router glue between clients, the store and the transaction log.
//!
//! ## Write Path
//! 1. Mutate the store synchronously
//! 2. Queue the matching event on the logger (returns once queued)
//!
//! Reads only touch the store. The logger never reads the store.

use std::sync::Arc;

use crate::config::Config;
use crate::error::{Result, TxLogError};
use crate::protocol::Command;
use crate::store::Store;
use crate::txlog::{self, RecoveryStats, TransactionLogger};

/// A store paired with the logger that makes its mutations durable
pub struct Service {
    store: Arc<Store>,
    logger: Arc<dyn TransactionLogger>,
}

impl Service {
    /// Wrap an already recovered store and running logger
    pub fn new(store: Arc<Store>, logger: Arc<dyn TransactionLogger>) -> Self {
        Self { store, logger }
    }

    /// Open the configured logger and rebuild an empty store from it
    ///
    /// Fails if the log cannot be opened or replayed; the caller must not
    /// serve traffic in that case.
    pub fn open(config: &Config) -> Result<(Self, RecoveryStats)> {
        let logger = txlog::open_logger(config)?;
        let store = Arc::new(Store::new());
        let stats = txlog::recover(logger.as_ref(), &store)?;
        Ok((Self::new(store, logger), stats))
    }

    /// Execute a command
    ///
    /// Routes commands to appropriate handlers
    pub fn execute(&self, command: Command) -> Result<Option<Vec<u8>>> {
        match command {
            Command::Get { key } => self.get(&key).map(|value| Some(value.into_bytes())),
            Command::Put { key, value } => {
                self.put(&key, &value)?;
                Ok(None)
            }
            Command::Delete { key } => {
                self.delete(&key)?;
                Ok(None)
            }
            Command::Ping => Ok(Some(b"PONG".to_vec())),
        }
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Result<String> {
        self.store.get(key).ok_or(TxLogError::KeyNotFound)
    }

    /// Put a key-value pair
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.store.put(key, value)?;
        self.logger.write_put(key, value);
        Ok(())
    }

    /// Delete a key
    pub fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(key)?;
        self.logger.write_delete(key);
        Ok(())
    }

    /// Drain pending log writes and stop the writer
    pub fn close(&self) -> Result<()> {
        self.logger.close()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn logger(&self) -> &Arc<dyn TransactionLogger> {
        &self.logger
    }
}
