//! Store Module
//!
//! In-memory key-value map that request handlers read and mutate.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Internally synchronized (many concurrent readers, one writer at a time)
//! - Receives replayed events at startup
//!
//! The store never talks to the transaction log; callers mutate it first
//! and then notify the logger.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::error::{Result, TxLogError};

/// Thread-safe in-memory key-value map
#[derive(Debug, Default)]
pub struct Store {
    data: RwLock<HashMap<String, String>>,
}

impl Store {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by key (read lock)
    pub fn get(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    /// Insert or overwrite a key (write lock)
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        check_key(key)?;
        self.data.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Remove a key; removing an absent key is not an error
    pub fn delete(&self, key: &str) -> Result<()> {
        check_key(key)?;
        self.data.write().remove(key);
        Ok(())
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Sorted copy of the contents
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(TxLogError::InvalidKey("key must not be empty".to_string()));
    }
    Ok(())
}
