//! Tests for startup recovery
//!
//! These tests verify:
//! - Replayed events rebuild the store for every backend
//! - Recovery starts the writer only after a clean replay
//! - Corrupt logs abort recovery and leave the logger unusable
//! - The error drain sees asynchronous write failures

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel;
use tempfile::TempDir;
use txlogkv::txlog::{open_logger, recover, spawn_error_drain, LoggerState, TransactionLogger};
use txlogkv::{Config, Store, TxLogError};

// =============================================================================
// Helper Functions
// =============================================================================

fn file_config(path: &Path) -> Config {
    Config::builder().file_backend(path).build()
}

fn sqlite_config(path: &Path) -> Config {
    Config::builder().sqlite_backend(path, "transactions").build()
}

/// Write a put/put/delete history through a freshly recovered logger
fn write_history(config: &Config) {
    let logger = open_logger(config).unwrap();
    let store = Store::new();
    recover(logger.as_ref(), &store).unwrap();

    logger.write_put("a", "1");
    logger.write_put("b", "2");
    logger.write_delete("a");
    logger.close().unwrap();
}

fn assert_restored(config: &Config) {
    let logger = open_logger(config).unwrap();
    let store = Store::new();
    let stats = recover(logger.as_ref(), &store).unwrap();

    assert_eq!(stats.events_applied, 3);
    assert_eq!(stats.puts, 2);
    assert_eq!(stats.deletes, 1);
    assert_eq!(stats.last_sequence, 3);

    let contents: Vec<(String, String)> = store.snapshot().into_iter().collect();
    assert_eq!(contents, vec![("b".to_string(), "2".to_string())]);
    assert_eq!(logger.state(), LoggerState::Running);

    logger.close().unwrap();
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_file_backend_restores_store() {
    let temp = TempDir::new().unwrap();
    let config = file_config(&temp.path().join("transaction.log"));

    write_history(&config);
    assert_restored(&config);
}

#[test]
fn test_sqlite_backend_restores_store() {
    let temp = TempDir::new().unwrap();
    let config = sqlite_config(&temp.path().join("kvs.db"));

    write_history(&config);
    assert_restored(&config);
}

#[test]
fn test_fresh_log_recovers_empty_store() {
    let temp = TempDir::new().unwrap();
    let config = file_config(&temp.path().join("transaction.log"));

    let logger = open_logger(&config).unwrap();
    let store = Store::new();
    let stats = recover(logger.as_ref(), &store).unwrap();

    assert_eq!(stats.events_applied, 0);
    assert!(store.is_empty());
    assert_eq!(logger.state(), LoggerState::Running);
    logger.close().unwrap();
}

#[test]
fn test_recovery_continues_sequence_for_new_writes() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("transaction.log");
    let config = file_config(&path);

    write_history(&config);

    let logger = open_logger(&config).unwrap();
    recover(logger.as_ref(), &Store::new()).unwrap();
    logger.write_put("c", "3");
    logger.close().unwrap();

    let contents = fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().last(), Some("4\t2\tc\t3"));
}

#[test]
fn test_corrupt_log_aborts_recovery() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("transaction.log");
    fs::write(&path, "1\t2\ta\t1\n2\t2\tb\t2\n1\t1\ta\t\n").unwrap();

    let logger = open_logger(&file_config(&path)).unwrap();
    let store = Store::new();

    match recover(logger.as_ref(), &store) {
        Err(e) => assert!(e.is_corruption(), "unexpected error {:?}", e),
        Ok(stats) => panic!("recovered from a corrupt log: {:?}", stats),
    }

    // Writer was never started and cannot be
    assert_eq!(logger.state(), LoggerState::ReplayFailed);
    assert!(logger.run().is_err());
}

#[test]
fn test_recover_twice_is_refused() {
    let temp = TempDir::new().unwrap();
    let config = file_config(&temp.path().join("transaction.log"));

    let logger = open_logger(&config).unwrap();
    recover(logger.as_ref(), &Store::new()).unwrap();

    let second = recover(logger.as_ref(), &Store::new());
    assert!(matches!(second, Err(TxLogError::ReplayUnavailable(_))));
    logger.close().unwrap();
}

#[test]
fn test_invalid_config_is_rejected_before_open() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .file_backend(temp.path().join("transaction.log"))
        .queue_capacity(0)
        .build();

    assert!(matches!(open_logger(&config), Err(TxLogError::Config(_))));
}

// =============================================================================
// Error Drain Tests
// =============================================================================

#[cfg(target_os = "linux")]
#[test]
fn test_error_drain_sees_write_failure() {
    let logger: Arc<dyn TransactionLogger> = open_logger(&file_config(Path::new("/dev/full"))).unwrap();
    logger.run().unwrap();

    let (seen_tx, seen_rx) = channel::unbounded();
    spawn_error_drain(logger.err(), move |err| {
        let _ = seen_tx.send(err.to_string());
    })
    .unwrap();

    logger.write_put("a", "1");

    let message = seen_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(message.contains("sequence 1"), "unexpected message {}", message);

    logger.close().unwrap();
    assert!(seen_rx.recv_timeout(Duration::from_millis(100)).is_err());
}
