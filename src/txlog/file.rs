//! File-backed transaction logger
//!
//! Append-only text file, one tab-separated record per event (see
//! [`super::record`]). Sequence numbers are assigned by the writer from an
//! in-memory counter that replay advances to the last record on disk.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::Receiver;
use parking_lot::Mutex;

use crate::config::SyncStrategy;
use crate::error::{Result, TxLogError};

use super::pipeline::{LogSink, LoggerState, WritePipeline};
use super::record::{decode_record, encode_record};
use super::replay::spawn_replay;
use super::{Event, LoggerOptions, TransactionLogger};

const BACKEND: &str = "file";

/// Transaction logger writing to an append-only file
pub struct FileTransactionLogger {
    path: PathBuf,

    /// Append handle, moved into the writer thread by `run()`
    file: Mutex<Option<File>>,

    /// High-water mark shared by replay and the writer
    last_sequence: Arc<AtomicU64>,

    sync_strategy: SyncStrategy,
    pipeline: WritePipeline,
}

impl FileTransactionLogger {
    /// Open or create the log file at `path`
    pub fn open(path: &Path, options: LoggerOptions) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(|e| TxLogError::backend_open(BACKEND, e.into()))?;

        tracing::debug!(path = %path.display(), "opened transaction log file");

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(Some(file)),
            last_sequence: Arc::new(AtomicU64::new(0)),
            sync_strategy: options.sync_strategy,
            pipeline: WritePipeline::new(
                BACKEND,
                options.queue_capacity,
                options.write_failure_policy,
            ),
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of events waiting for the writer
    pub fn queued(&self) -> usize {
        self.pipeline.queued()
    }
}

impl TransactionLogger for FileTransactionLogger {
    fn write_put(&self, key: &str, value: &str) {
        self.pipeline.enqueue(Event::put(key, value));
    }

    fn write_delete(&self, key: &str) {
        self.pipeline.enqueue(Event::delete(key));
    }

    fn err(&self) -> Receiver<TxLogError> {
        self.pipeline.errors()
    }

    fn read_events(&self) -> (Receiver<Event>, Receiver<TxLogError>) {
        let path = self.path.clone();

        spawn_replay(BACKEND, &self.pipeline, Arc::clone(&self.last_sequence), move |emitter| {
            let file = File::open(&path)?;
            let reader = BufReader::new(file);

            for (index, line) in reader.lines().enumerate() {
                let line = line?;
                let event = decode_record(&line, index as u64 + 1)?;
                emitter.emit(event)?;
            }

            Ok(())
        })
    }

    fn run(&self) -> Result<()> {
        self.pipeline.start(|| {
            // Without a replay the counter has not seen the records on disk
            if self.last_sequence.load(Ordering::SeqCst) == 0 {
                let last = scan_last_sequence(&self.path)?;
                self.last_sequence.store(last, Ordering::SeqCst);
            }

            let file = self.file.lock().take().ok_or_else(|| {
                TxLogError::Config("transaction log file already handed to a writer".to_string())
            })?;

            Ok(FileSink {
                file,
                last_sequence: Arc::clone(&self.last_sequence),
                sync_strategy: self.sync_strategy,
                unsynced: 0,
            })
        })
    }

    fn close(&self) -> Result<()> {
        self.pipeline.close()
    }

    fn state(&self) -> LoggerState {
        self.pipeline.state()
    }

    fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::SeqCst)
    }
}

/// Highest sequence recorded in the file at `path`, 0 when empty
fn scan_last_sequence(path: &Path) -> Result<u64> {
    let file = File::open(path)?;
    let metadata = file.metadata()?;
    // Device files such as /dev/full read back endless bytes
    if !metadata.is_file() || metadata.len() == 0 {
        return Ok(0);
    }

    let reader = BufReader::new(file);
    let mut last = 0;

    for (index, line) in reader.lines().enumerate() {
        let event = decode_record(&line?, index as u64 + 1)?;
        last = last.max(event.sequence);
    }

    if last > 0 {
        tracing::debug!(last_sequence = last, "seeded sequence counter without replay");
    }
    Ok(last)
}

/// Writer-side state of the file backend
struct FileSink {
    file: File,
    last_sequence: Arc<AtomicU64>,
    sync_strategy: SyncStrategy,
    unsynced: usize,
}

impl LogSink for FileSink {
    fn append(&mut self, event: Event) -> Result<u64> {
        let sequence = self.last_sequence.load(Ordering::SeqCst) + 1;
        let record = encode_record(&event.with_sequence(sequence));

        // One write per record so a failure never leaves buffered leftovers
        self.file
            .write_all(record.as_bytes())
            .map_err(|e| TxLogError::WriteFailed {
                sequence,
                reason: e.to_string(),
            })?;
        self.last_sequence.store(sequence, Ordering::SeqCst);

        self.unsynced += 1;
        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => self.unsynced >= count,
        };
        if due {
            self.sync()?;
        }

        Ok(sequence)
    }

    fn sync(&mut self) -> Result<()> {
        if self.unsynced == 0 {
            return Ok(());
        }
        self.file.sync_data().map_err(|e| TxLogError::WriteFailed {
            sequence: self.last_sequence.load(Ordering::SeqCst),
            reason: format!("fsync failed: {}", e),
        })?;
        self.unsynced = 0;
        Ok(())
    }
}
