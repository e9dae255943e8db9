//! Startup recovery
//!
//! Rebuilds the store from the transaction log and then switches the
//! logger into write mode. Any replay error aborts recovery: the service
//! must not serve traffic from a partial state.

use std::thread::{self, JoinHandle};

use crossbeam::channel::{select, Receiver};

use crate::error::{Result, TxLogError};
use crate::store::Store;

use super::{Event, EventType, TransactionLogger};

/// Summary of a successful replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Events applied to the store
    pub events_applied: u64,

    /// How many of them were Puts
    pub puts: u64,

    /// How many of them were Deletes
    pub deletes: u64,

    /// High-water mark the writer continues from
    pub last_sequence: u64,
}

/// Replay the whole log into `store`, then start the logger's writer
///
/// 1. Read events and errors concurrently
/// 2. Apply each event to the store in sequence order
/// 3. Stop at the first error, or when the log is exhausted
/// 4. On a clean finish, call `run()`
pub fn recover(logger: &dyn TransactionLogger, store: &Store) -> Result<RecoveryStats> {
    let (events, errors) = logger.read_events();
    let mut stats = RecoveryStats::default();

    loop {
        select! {
            recv(events) -> msg => match msg {
                Ok(event) => apply(store, &event, &mut stats)?,
                Err(_) => break,
            },
            recv(errors) -> msg => match msg {
                Ok(err) => return Err(err),
                Err(_) => break,
            },
        }
    }

    // The event stream can close before a pending error is picked up
    if let Ok(err) = errors.recv() {
        return Err(err);
    }

    logger.run()?;
    stats.last_sequence = logger.last_sequence();

    tracing::info!(
        events = stats.events_applied,
        puts = stats.puts,
        deletes = stats.deletes,
        last_sequence = stats.last_sequence,
        "recovered store from transaction log"
    );

    Ok(stats)
}

fn apply(store: &Store, event: &Event, stats: &mut RecoveryStats) -> Result<()> {
    match event.event_type {
        EventType::Put => {
            store.put(&event.key, &event.value)?;
            stats.puts += 1;
        }
        EventType::Delete => {
            store.delete(&event.key)?;
            stats.deletes += 1;
        }
    }
    stats.events_applied += 1;
    tracing::trace!(sequence = event.sequence, key = %event.key, "replayed {}", event.event_type);
    Ok(())
}

/// Drain the logger's error stream for the rest of its life
///
/// Every failure is logged, then handed to `on_error` so the owner can
/// escalate (count it, flip a health flag, exit). The thread ends once the
/// logger and its writer are gone.
pub fn spawn_error_drain<F>(errors: Receiver<TxLogError>, mut on_error: F) -> Result<JoinHandle<()>>
where
    F: FnMut(&TxLogError) + Send + 'static,
{
    let handle = thread::Builder::new()
        .name("txlog-error-drain".to_string())
        .spawn(move || {
            for err in errors.iter() {
                tracing::error!(error = %err, "transaction log write error");
                on_error(&err);
            }
            tracing::debug!("transaction log error stream closed");
        })?;

    Ok(handle)
}
