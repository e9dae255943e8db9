//! Tests for the file-backed transaction logger
//!
//! These tests verify:
//! - Round trip: written events replay identically with sequences 1..=n
//! - Sequence continuation across restarts
//! - Replay rejects malformed and non-increasing records
//! - Replay is single-use and ordered with respect to run()
//! - Backpressure while the writer is not draining
//! - Halt after a write failure

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel;
use tempfile::TempDir;
use txlogkv::txlog::{
    Event, EventType, FileTransactionLogger, LoggerOptions, LoggerState, TransactionLogger,
};
use txlogkv::TxLogError;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_log() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("transaction.log");
    (temp_dir, log_path)
}

fn open(path: &Path) -> FileTransactionLogger {
    FileTransactionLogger::open(path, LoggerOptions::default()).unwrap()
}

/// Collect every replayed event and the error (if any) that ended replay
fn replay(logger: &dyn TransactionLogger) -> (Vec<Event>, Option<TxLogError>) {
    let (events, errors) = logger.read_events();
    let collected: Vec<Event> = events.iter().collect();
    (collected, errors.recv().ok())
}

/// Open, replay cleanly, and start writing
fn open_running(path: &Path) -> FileTransactionLogger {
    let logger = open(path);
    let (_, err) = replay(&logger);
    assert!(err.is_none(), "unexpected replay error: {:?}", err);
    logger.run().unwrap();
    logger
}

fn wait_for_sequence(logger: &dyn TransactionLogger, sequence: u64) {
    for _ in 0..500 {
        if logger.last_sequence() >= sequence {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("writer never reached sequence {}", sequence);
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_put_put_delete_replays_in_order() {
    let (_temp, path) = setup_temp_log();

    let logger = open_running(&path);
    logger.write_put("a", "1");
    logger.write_put("b", "2");
    logger.write_delete("a");
    logger.close().unwrap();

    let restarted = open(&path);
    let (events, err) = replay(&restarted);

    assert!(err.is_none());
    assert_eq!(
        events,
        vec![
            Event::put("a", "1").with_sequence(1),
            Event::put("b", "2").with_sequence(2),
            Event::delete("a").with_sequence(3),
        ]
    );
    assert_eq!(restarted.state(), LoggerState::Replayed);
    assert_eq!(restarted.last_sequence(), 3);
}

#[test]
fn test_file_contents_match_record_format() {
    let (_temp, path) = setup_temp_log();

    let logger = open_running(&path);
    logger.write_put("a", "1");
    logger.write_delete("a");
    logger.close().unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "1\t2\ta\t1\n2\t1\ta\t\n");
}

#[test]
fn test_many_events_get_contiguous_sequences() {
    let (_temp, path) = setup_temp_log();

    let logger = open_running(&path);
    for i in 0..200 {
        if i % 3 == 2 {
            logger.write_delete(&format!("key{}", i - 1));
        } else {
            logger.write_put(&format!("key{}", i), &format!("value{}", i));
        }
    }
    logger.close().unwrap();

    let (events, err) = replay(&open(&path));
    assert!(err.is_none());
    assert_eq!(events.len(), 200);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.sequence, i as u64 + 1);
        let expected_type = if i % 3 == 2 { EventType::Delete } else { EventType::Put };
        assert_eq!(event.event_type, expected_type);
    }
}

#[test]
fn test_tabs_and_newlines_in_data_survive() {
    let (_temp, path) = setup_temp_log();

    let logger = open_running(&path);
    logger.write_put("key\twith\ttabs", "multi\nline\r\nvalue \\ done");
    logger.close().unwrap();

    let (events, err) = replay(&open(&path));
    assert!(err.is_none());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key, "key\twith\ttabs");
    assert_eq!(events[0].value, "multi\nline\r\nvalue \\ done");
}

#[test]
fn test_sequence_continues_after_restart() {
    let (_temp, path) = setup_temp_log();

    let first = open_running(&path);
    first.write_put("a", "1");
    first.write_put("b", "2");
    first.close().unwrap();

    let second = open_running(&path);
    assert_eq!(second.last_sequence(), 2);
    second.write_put("c", "3");
    second.close().unwrap();

    let (events, err) = replay(&open(&path));
    assert!(err.is_none());
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
}

#[test]
fn test_run_without_replay_continues_sequence() {
    let (_temp, path) = setup_temp_log();

    let first = open_running(&path);
    first.write_put("a", "1");
    first.close().unwrap();

    // Skip replay and start writing straight away
    let second = open(&path);
    second.run().unwrap();
    assert_eq!(second.last_sequence(), 1);
    second.write_put("b", "2");
    second.close().unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "1\t2\ta\t1\n2\t2\tb\t2\n");

    let (events, err) = replay(&open(&path));
    assert!(err.is_none(), "unexpected replay error: {:?}", err);
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2]);
}

#[test]
fn test_run_without_replay_refuses_corrupt_log() {
    let (_temp, path) = setup_temp_log();
    fs::write(&path, "1\t2\ta\t1\nnot a record\n").unwrap();

    let logger = open(&path);
    assert!(matches!(logger.run(), Err(TxLogError::RecordParse { line: 2, .. })));
    assert_eq!(logger.state(), LoggerState::Constructed);
}

#[test]
fn test_writes_before_run_are_flushed_after_run() {
    let (_temp, path) = setup_temp_log();

    let logger = open(&path);
    logger.write_put("early", "bird");
    assert_eq!(logger.queued(), 1);
    assert_eq!(fs::read_to_string(&path).unwrap(), "");

    logger.run().unwrap();
    logger.close().unwrap();

    let (events, _) = replay(&open(&path));
    assert_eq!(events, vec![Event::put("early", "bird").with_sequence(1)]);
}

#[test]
fn test_empty_log_replays_nothing() {
    let (_temp, path) = setup_temp_log();

    let logger = open(&path);
    let (events, err) = replay(&logger);

    assert!(events.is_empty());
    assert!(err.is_none());
    assert_eq!(logger.last_sequence(), 0);
}

// =============================================================================
// Replay Validation Tests
// =============================================================================

#[test]
fn test_replay_accepts_gaps() {
    let (_temp, path) = setup_temp_log();
    fs::write(&path, "1\t2\ta\t1\n5\t2\tb\t2\n9\t1\ta\t\n").unwrap();

    let logger = open(&path);
    let (events, err) = replay(&logger);

    assert!(err.is_none());
    assert_eq!(events.len(), 3);
    assert_eq!(logger.last_sequence(), 9);
}

#[test]
fn test_replay_rejects_repeated_sequence() {
    let (_temp, path) = setup_temp_log();
    fs::write(&path, "1\t2\ta\t1\n2\t2\tb\t2\n2\t1\ta\t\n").unwrap();

    let logger = open(&path);
    let (events, err) = replay(&logger);

    assert_eq!(events.len(), 2);
    match err {
        Some(TxLogError::OutOfSequence { previous, found }) => {
            assert_eq!(previous, 2);
            assert_eq!(found, 2);
        }
        other => panic!("expected sequencing error, got {:?}", other),
    }
    assert_eq!(logger.state(), LoggerState::ReplayFailed);
}

#[test]
fn test_replay_read_failure_surfaces_as_io() {
    let (_temp, path) = setup_temp_log();
    let mut contents = b"1\t2\ta\t1\n".to_vec();
    contents.extend_from_slice(&[b'2', b'\t', b'2', b'\t', 0xff, 0xfe, b'\t', b'v', b'\n']);
    fs::write(&path, contents).unwrap();

    let (events, err) = replay(&open(&path));

    assert_eq!(events.len(), 1);
    match err {
        Some(e @ TxLogError::Io(_)) => assert!(!e.is_corruption()),
        other => panic!("expected an I/O error, got {:?}", other),
    }
}

#[test]
fn test_replay_rejects_decreasing_sequence() {
    let (_temp, path) = setup_temp_log();
    fs::write(&path, "3\t2\ta\t1\n1\t2\tb\t2\n").unwrap();

    let (events, err) = replay(&open(&path));

    assert_eq!(events.len(), 1);
    assert!(matches!(err, Some(TxLogError::OutOfSequence { previous: 3, found: 1 })));
}

#[test]
fn test_replay_rejects_zero_sequence() {
    let (_temp, path) = setup_temp_log();
    fs::write(&path, "0\t2\ta\t1\n").unwrap();

    let (events, err) = replay(&open(&path));

    assert!(events.is_empty());
    assert!(matches!(err, Some(TxLogError::OutOfSequence { .. })));
}

#[test]
fn test_replay_rejects_malformed_record() {
    let (_temp, path) = setup_temp_log();
    fs::write(&path, "1\t2\ta\t1\nthis is not a record\n3\t2\tc\t3\n").unwrap();

    let (events, err) = replay(&open(&path));

    assert_eq!(events.len(), 1);
    match err {
        Some(e @ TxLogError::RecordParse { line: 2, .. }) => assert!(e.is_corruption()),
        other => panic!("expected parse error on record 2, got {:?}", other),
    }
}

#[test]
fn test_replay_failure_is_terminal() {
    let (_temp, path) = setup_temp_log();
    fs::write(&path, "1\t7\ta\t1\n").unwrap();

    let logger = open(&path);
    let (_, err) = replay(&logger);
    assert!(err.is_some());

    assert!(logger.run().is_err());
    let (events, err) = replay(&logger);
    assert!(events.is_empty());
    assert!(matches!(err, Some(TxLogError::ReplayUnavailable(_))));
}

#[test]
fn test_replay_is_single_use() {
    let (_temp, path) = setup_temp_log();
    fs::write(&path, "1\t2\ta\t1\n").unwrap();

    let logger = open(&path);
    let (events, err) = replay(&logger);
    assert_eq!(events.len(), 1);
    assert!(err.is_none());

    let (events, err) = replay(&logger);
    assert!(events.is_empty());
    assert!(matches!(err, Some(TxLogError::ReplayUnavailable(_))));

    // The first replay still counts; writes continue after it
    logger.run().unwrap();
    logger.write_put("b", "2");
    logger.close().unwrap();

    let (events, _) = replay(&open(&path));
    assert_eq!(events.last().map(|e| e.sequence), Some(2));
}

#[test]
fn test_replay_after_run_is_refused() {
    let (_temp, path) = setup_temp_log();

    let logger = open(&path);
    logger.run().unwrap();

    let (events, err) = replay(&logger);
    assert!(events.is_empty());
    assert!(matches!(err, Some(TxLogError::ReplayUnavailable(_))));
    logger.close().unwrap();
}

// =============================================================================
// Writer Behaviour Tests
// =============================================================================

#[test]
fn test_full_queue_blocks_until_writer_runs() {
    let (_temp, path) = setup_temp_log();
    let options = LoggerOptions {
        queue_capacity: 2,
        ..LoggerOptions::default()
    };
    let logger = Arc::new(FileTransactionLogger::open(&path, options).unwrap());

    let (done_tx, done_rx) = channel::bounded(1);
    let producer = {
        let logger = Arc::clone(&logger);
        thread::spawn(move || {
            for i in 0..3 {
                logger.write_put(&format!("k{}", i), "v");
            }
            done_tx.send(()).unwrap();
        })
    };

    // Two fit in the queue, the third waits for space
    assert!(done_rx.recv_timeout(Duration::from_millis(300)).is_err());
    assert_eq!(logger.queued(), 2);

    logger.run().unwrap();
    done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    producer.join().unwrap();
    logger.close().unwrap();

    let (events, _) = replay(&open(&path));
    assert_eq!(events.len(), 3);
}

#[test]
fn test_writes_after_close_are_dropped() {
    let (_temp, path) = setup_temp_log();

    let logger = open_running(&path);
    logger.write_put("a", "1");
    logger.close().unwrap();
    assert_eq!(logger.state(), LoggerState::Closed);

    // Must not block even though nobody drains the queue
    for i in 0..100 {
        logger.write_put(&format!("late{}", i), "x");
    }

    let (events, _) = replay(&open(&path));
    assert_eq!(events.len(), 1);
}

#[test]
fn test_empty_key_is_reported_and_not_written() {
    let (_temp, path) = setup_temp_log();

    let logger = open_running(&path);
    let errors = logger.err();
    logger.write_put("", "v");
    logger.write_delete("");
    logger.write_put("a", "1");
    logger.close().unwrap();

    let first = errors.recv_timeout(Duration::from_secs(5)).unwrap();
    let second = errors.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(first, TxLogError::InvalidKey(_)));
    assert!(matches!(second, TxLogError::InvalidKey(_)));

    let (events, err) = replay(&open(&path));
    assert!(err.is_none(), "unexpected replay error: {:?}", err);
    assert_eq!(events, vec![Event::put("a", "1").with_sequence(1)]);
}

#[test]
fn test_concurrent_producers_all_land() {
    let (_temp, path) = setup_temp_log();
    let logger = Arc::new(open_running(&path));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                for i in 0..50 {
                    logger.write_put(&format!("t{}-{}", t, i), "v");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    logger.close().unwrap();

    let (events, err) = replay(&open(&path));
    assert!(err.is_none());
    assert_eq!(events.len(), 200);

    // Each producer's own writes keep their relative order
    for t in 0..4 {
        let prefix = format!("t{}-", t);
        let own: Vec<usize> = events
            .iter()
            .filter(|e| e.key.starts_with(&prefix))
            .map(|e| e.key[prefix.len()..].parse().unwrap())
            .collect();
        assert_eq!(own, (0..50).collect::<Vec<_>>());
    }
}

#[test]
fn test_sync_every_n_entries_still_flushes_on_close() {
    let (_temp, path) = setup_temp_log();
    let options = LoggerOptions {
        sync_strategy: txlogkv::config::SyncStrategy::EveryNEntries { count: 100 },
        ..LoggerOptions::default()
    };

    let logger = FileTransactionLogger::open(&path, options).unwrap();
    logger.run().unwrap();
    for i in 0..7 {
        logger.write_put(&format!("k{}", i), "v");
    }
    wait_for_sequence(&logger, 7);
    logger.close().unwrap();

    let (events, _) = replay(&open(&path));
    assert_eq!(events.len(), 7);
}

#[cfg(target_os = "linux")]
#[test]
fn test_write_failure_halts_writer() {
    // Every write to /dev/full fails with ENOSPC
    let logger = FileTransactionLogger::open(Path::new("/dev/full"), LoggerOptions::default())
        .unwrap();
    let errors = logger.err();
    logger.run().unwrap();

    logger.write_put("a", "1");
    let first = errors.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(first, TxLogError::WriteFailed { sequence: 1, .. }));

    for i in 0..40 {
        logger.write_put(&format!("more{}", i), "x");
    }
    logger.close().unwrap();

    assert!(errors.try_recv().is_err());
    assert_eq!(logger.last_sequence(), 0);
}

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_open_directory_fails() {
    let temp = TempDir::new().unwrap();

    match FileTransactionLogger::open(temp.path(), LoggerOptions::default()) {
        Err(TxLogError::BackendOpen { backend, .. }) => assert_eq!(backend, "file"),
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("opened a directory as a log file"),
    }
}
