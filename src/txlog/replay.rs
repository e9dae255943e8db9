//! Replay plumbing shared by every backend
//!
//! Each backend supplies a closure that walks its storage front to back and
//! hands every decoded event to a [`ReplayEmitter`]. The emitter enforces
//! the strictly-increasing sequence rule and forwards events to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::{Result, TxLogError};

use super::pipeline::{LoggerState, WritePipeline};
use super::Event;

/// Forwards replayed events, tracking the high-water mark
pub(crate) struct ReplayEmitter {
    events: Sender<Event>,
    high_water: u64,
    last_sequence: Arc<AtomicU64>,
    emitted: u64,
}

impl ReplayEmitter {
    /// Check ordering, advance the high-water mark and yield the event
    pub(crate) fn emit(&mut self, event: Event) -> Result<()> {
        if event.sequence <= self.high_water {
            return Err(TxLogError::OutOfSequence {
                previous: self.high_water,
                found: event.sequence,
            });
        }

        self.high_water = event.sequence;
        self.last_sequence.store(event.sequence, Ordering::SeqCst);

        self.events.send(event).map_err(|_| {
            TxLogError::ReplayUnavailable("replay consumer stopped reading".to_string())
        })?;
        self.emitted += 1;
        Ok(())
    }
}

/// Streams that carry nothing but one error
pub(crate) fn failed_replay(err: TxLogError) -> (Receiver<Event>, Receiver<TxLogError>) {
    let (_, events) = channel::bounded(0);
    let (errors_tx, errors) = channel::bounded(1);
    let _ = errors_tx.send(err);
    (events, errors)
}

/// Run `walk` on a dedicated thread, streaming what it emits
///
/// The event stream is unbuffered so the walk advances only as fast as the
/// consumer applies events.
pub(crate) fn spawn_replay<F>(
    backend: &'static str,
    pipeline: &WritePipeline,
    last_sequence: Arc<AtomicU64>,
    walk: F,
) -> (Receiver<Event>, Receiver<TxLogError>)
where
    F: FnOnce(&mut ReplayEmitter) -> Result<()> + Send + 'static,
{
    if let Err(err) = pipeline.begin_replay() {
        return failed_replay(err);
    }

    let (events_tx, events_rx) = channel::bounded(0);
    let (errors_tx, errors_rx) = channel::bounded(1);
    let state = pipeline.state_handle();

    let mut emitter = ReplayEmitter {
        events: events_tx,
        high_water: last_sequence.load(Ordering::SeqCst),
        last_sequence,
        emitted: 0,
    };

    let spawned = thread::Builder::new()
        .name(format!("txlog-{}-replay", backend))
        .spawn(move || {
            tracing::debug!(backend, "transaction log replay started");
            let outcome = walk(&mut emitter);

            // State settles before the streams close so run() sees it
            match outcome {
                Ok(()) => {
                    *state.lock() = LoggerState::Replayed;
                    tracing::info!(
                        backend,
                        events = emitter.emitted,
                        last_sequence = emitter.high_water,
                        "transaction log replay complete"
                    );
                }
                Err(err) => {
                    *state.lock() = LoggerState::ReplayFailed;
                    tracing::error!(
                        backend,
                        after_events = emitter.emitted,
                        error = %err,
                        "transaction log replay failed"
                    );
                    let _ = errors_tx.send(err);
                }
            }
        });

    match spawned {
        Ok(_) => (events_rx, errors_rx),
        Err(err) => {
            *pipeline.state_handle().lock() = LoggerState::ReplayFailed;
            failed_replay(err.into())
        }
    }
}
