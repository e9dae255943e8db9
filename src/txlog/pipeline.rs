//! Write pipeline shared by every backend
//!
//! Producers push events into a bounded crossbeam channel; a single writer
//! thread owns the backend sink and drains the channel in FIFO order. The
//! channel is the only state shared between producers and the writer.
//!
//! ```text
//!  write_put ──┐
//!  write_put ──┼──► bounded queue ──► writer thread ──► LogSink::append
//!  write_del ──┘       (cap N)              │
//!                                           └── failures ──► err()
//! ```

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::config::WriteFailurePolicy;
use crate::error::{Result, TxLogError};

use super::Event;

/// Destination of the writer thread
///
/// Implementations are moved into the writer thread and never touched by
/// any other thread afterwards.
pub(crate) trait LogSink: Send + 'static {
    /// Durably append one event, returning the sequence it was stored under
    fn append(&mut self, event: Event) -> Result<u64>;

    /// Push everything appended so far to stable storage
    fn sync(&mut self) -> Result<()>;
}

/// Lifecycle of a transaction logger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerState {
    Constructed,
    Replaying,
    Replayed,
    ReplayFailed,
    Running,
    Closed,
}

impl fmt::Display for LoggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoggerState::Constructed => "constructed",
            LoggerState::Replaying => "replaying",
            LoggerState::Replayed => "replayed",
            LoggerState::ReplayFailed => "replay-failed",
            LoggerState::Running => "running",
            LoggerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Queue, writer thread and error channel of one logger
pub(crate) struct WritePipeline {
    backend: &'static str,
    policy: WriteFailurePolicy,

    /// Producer side; `None` once closed
    sender: RwLock<Option<Sender<Event>>>,

    /// Consumer side, parked here until the writer thread takes it
    pending: Mutex<Option<Receiver<Event>>>,

    errors_tx: Sender<TxLogError>,
    errors_rx: Receiver<TxLogError>,

    writer: Mutex<Option<JoinHandle<()>>>,
    state: Arc<Mutex<LoggerState>>,
}

impl WritePipeline {
    pub(crate) fn new(backend: &'static str, capacity: usize, policy: WriteFailurePolicy) -> Self {
        let (sender, receiver) = channel::bounded(capacity);
        let (errors_tx, errors_rx) = channel::unbounded();

        Self {
            backend,
            policy,
            sender: RwLock::new(Some(sender)),
            pending: Mutex::new(Some(receiver)),
            errors_tx,
            errors_rx,
            writer: Mutex::new(None),
            state: Arc::new(Mutex::new(LoggerState::Constructed)),
        }
    }

    /// Queue an event for the writer, blocking while the queue is full
    ///
    /// Events are accepted before the writer starts; they sit in the queue
    /// until `start` runs. After close or a halted writer they are dropped.
    /// Events with an empty key are refused and reported on `errors`, since
    /// replay would reject the record.
    pub(crate) fn enqueue(&self, event: Event) {
        if event.key.is_empty() {
            tracing::warn!(backend = self.backend, "refusing {} event with an empty key", event.event_type);
            let _ = self.errors_tx.send(TxLogError::InvalidKey(format!(
                "{} event with an empty key was not logged",
                event.event_type
            )));
            return;
        }

        // Clone so the lock is not held across a blocking send
        let sender = self.sender.read().clone();

        let Some(sender) = sender else {
            tracing::warn!(
                backend = self.backend,
                key = %event.key,
                "transaction logger is closed, dropping {} event",
                event.event_type
            );
            return;
        };

        if let Err(err) = sender.send(event) {
            let event = err.into_inner();
            tracing::warn!(
                backend = self.backend,
                key = %event.key,
                "transaction log writer has stopped, dropping {} event",
                event.event_type
            );
        }
    }

    /// Number of events waiting for the writer
    pub(crate) fn queued(&self) -> usize {
        self.sender.read().as_ref().map_or(0, Sender::len)
    }

    /// Receiver of asynchronous write failures
    pub(crate) fn errors(&self) -> Receiver<TxLogError> {
        self.errors_rx.clone()
    }

    pub(crate) fn state(&self) -> LoggerState {
        *self.state.lock()
    }

    /// Shared handle the replay thread uses to report completion
    pub(crate) fn state_handle(&self) -> Arc<Mutex<LoggerState>> {
        Arc::clone(&self.state)
    }

    /// Move from Constructed to Replaying; replay happens at most once
    pub(crate) fn begin_replay(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != LoggerState::Constructed {
            return Err(TxLogError::ReplayUnavailable(format!(
                "logger is {}, replay runs once before run()",
                *state
            )));
        }
        *state = LoggerState::Replaying;
        Ok(())
    }

    /// Spawn the writer thread around the sink built by `make_sink`
    ///
    /// The sink is only built when the transition to Running is legal.
    pub(crate) fn start<S, F>(&self, make_sink: F) -> Result<()>
    where
        S: LogSink,
        F: FnOnce() -> Result<S>,
    {
        let mut state = self.state.lock();
        match *state {
            LoggerState::Running => {
                tracing::warn!(backend = self.backend, "transaction logger already running");
                return Ok(());
            }
            LoggerState::ReplayFailed | LoggerState::Closed => {
                return Err(TxLogError::Config(format!(
                    "cannot run a transaction logger that is {}",
                    *state
                )));
            }
            LoggerState::Replaying => {
                return Err(TxLogError::Config(
                    "cannot run while replay is still in progress".to_string(),
                ));
            }
            LoggerState::Constructed | LoggerState::Replayed => {}
        }

        let sink = make_sink()?;
        let Some(receiver) = self.pending.lock().take() else {
            return Err(TxLogError::Config("writer queue already consumed".to_string()));
        };
        let errors = self.errors_tx.clone();
        let policy = self.policy;
        let backend = self.backend;

        let handle = thread::Builder::new()
            .name(format!("txlog-{}-writer", backend))
            .spawn(move || writer_loop(backend, sink, receiver, errors, policy))?;

        *self.writer.lock() = Some(handle);
        *state = LoggerState::Running;

        tracing::info!(backend, policy = ?policy, "transaction log writer started");
        Ok(())
    }

    /// Stop accepting events, drain the queue and join the writer
    pub(crate) fn close(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state == LoggerState::Closed {
                return Ok(());
            }
            *state = LoggerState::Closed;
        }

        // Dropping the last sender lets the writer finish the queue and exit
        drop(self.sender.write().take());

        if let Some(receiver) = self.pending.lock().take() {
            if !receiver.is_empty() {
                tracing::warn!(
                    backend = self.backend,
                    dropped = receiver.len(),
                    "closing a logger that never ran, queued events are discarded"
                );
            }
        }

        let handle = self.writer.lock().take();
        if let Some(handle) = handle {
            handle.join().map_err(|_| {
                TxLogError::Io(std::io::Error::other("transaction log writer panicked"))
            })?;
        }

        tracing::info!(backend = self.backend, "transaction logger closed");
        Ok(())
    }
}

/// Body of the writer thread
fn writer_loop<S: LogSink>(
    backend: &'static str,
    mut sink: S,
    events: Receiver<Event>,
    errors: Sender<TxLogError>,
    policy: WriteFailurePolicy,
) {
    for event in events.iter() {
        let key = event.key.clone();
        match sink.append(event) {
            Ok(sequence) => {
                tracing::trace!(backend, sequence, key = %key, "event appended");
            }
            Err(err) => {
                tracing::error!(backend, key = %key, error = %err, "transaction log write failed");
                let _ = errors.send(err);
                if policy == WriteFailurePolicy::Halt {
                    tracing::error!(backend, "transaction log writer halted, later events are lost");
                    return;
                }
            }
        }
    }

    // Every sender is gone: the logger was closed or dropped
    if let Err(err) = sink.sync() {
        tracing::error!(backend, error = %err, "final transaction log sync failed");
        let _ = errors.send(err);
    }
    tracing::debug!(backend, "transaction log writer drained");
}
