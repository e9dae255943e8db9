//! SQLite-backed transaction logger
//!
//! ## Schema
//! ```text
//! CREATE TABLE <table> (
//!     sequence   INTEGER PRIMARY KEY AUTOINCREMENT,
//!     event_type SMALLINT NOT NULL,
//!     key        TEXT NOT NULL,
//!     value      TEXT
//! )
//! ```
//!
//! Sequence numbers come from `AUTOINCREMENT`, which never reuses a value,
//! so they stay strictly increasing even after rows are removed by hand.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::is_valid_table_name;
use crate::error::{Result, TxLogError};

use super::pipeline::{LogSink, LoggerState, WritePipeline};
use super::replay::spawn_replay;
use super::{Event, EventType, LoggerOptions, TransactionLogger};

const BACKEND: &str = "sqlite";

/// Transaction logger writing one row per event
pub struct SqliteTransactionLogger {
    /// Used by replay first, then only by the writer thread
    conn: Arc<Mutex<Connection>>,
    table: String,
    last_sequence: Arc<AtomicU64>,
    pipeline: WritePipeline,
}

impl SqliteTransactionLogger {
    /// Open the database at `path`, creating `table` if it is missing
    pub fn open(path: &Path, table: &str, options: LoggerOptions) -> Result<Self> {
        if !is_valid_table_name(table) {
            return Err(TxLogError::Config(format!("invalid table name: {:?}", table)));
        }

        let conn = Connection::open(path).map_err(|e| TxLogError::backend_open(BACKEND, e.into()))?;
        // Fail now rather than on the first insert if the file is not a database
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .map_err(|e| TxLogError::backend_open(BACKEND, e.into()))?;

        if !table_exists(&conn, table)? {
            create_table(&conn, table)?;
            tracing::info!(table, "created transaction table");
        }

        tracing::debug!(path = %path.display(), table, "opened transaction database");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: table.to_string(),
            last_sequence: Arc::new(AtomicU64::new(0)),
            pipeline: WritePipeline::new(
                BACKEND,
                options.queue_capacity,
                options.write_failure_policy,
            ),
        })
    }

    /// Name of the backing table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Number of events waiting for the writer
    pub fn queued(&self) -> usize {
        self.pipeline.queued()
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
    .map_err(|e| TxLogError::SchemaBootstrap(format!("error checking if table exists: {}", e)))
}

fn create_table(conn: &Connection, table: &str) -> Result<()> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            sequence INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type SMALLINT NOT NULL,
            key TEXT NOT NULL,
            value TEXT
        )",
        table
    );

    conn.execute(&sql, [])
        .map_err(|e| TxLogError::SchemaBootstrap(format!("failed to create table: {}", e)))?;
    Ok(())
}

impl TransactionLogger for SqliteTransactionLogger {
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
        let conn = Arc::clone(&self.conn);
        let sql = format!(
            "SELECT sequence, event_type, key, value FROM {} ORDER BY sequence",
            self.table
        );

        spawn_replay(BACKEND, &self.pipeline, Arc::clone(&self.last_sequence), move |emitter| {
            let conn = conn.lock();
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut row_no = 0u64;

            while let Some(row) = rows.next()? {
                row_no += 1;
                let parse_err = |reason: String| TxLogError::RecordParse { line: row_no, reason };

                let sequence: i64 = row.get(0)?;
                let code: i64 = row.get(1)?;
                let key: String = row.get(2)?;
                let value: Option<String> = row.get(3)?;

                let sequence = u64::try_from(sequence)
                    .map_err(|_| parse_err(format!("negative sequence {}", sequence)))?;
                let event_type = EventType::from_code(code)
                    .ok_or_else(|| parse_err(format!("bad event type {}", code)))?;
                if key.is_empty() {
                    return Err(parse_err("empty key".to_string()));
                }

                emitter.emit(Event {
                    sequence,
                    event_type,
                    key,
                    value: value.unwrap_or_default(),
                })?;
            }

            Ok(())
        })
    }

    fn run(&self) -> Result<()> {
        self.pipeline.start(|| {
            Ok(SqliteSink {
                conn: Arc::clone(&self.conn),
                insert_sql: format!(
                    "INSERT INTO {} (event_type, key, value) VALUES (?1, ?2, ?3)",
                    self.table
                ),
                last_sequence: Arc::clone(&self.last_sequence),
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

/// Writer-side state of the SQLite backend
struct SqliteSink {
    conn: Arc<Mutex<Connection>>,
    insert_sql: String,
    last_sequence: Arc<AtomicU64>,
}

impl LogSink for SqliteSink {
    fn append(&mut self, event: Event) -> Result<u64> {
        let conn = self.conn.lock();
        let value = match event.event_type {
            EventType::Put => Some(event.value.as_str()),
            EventType::Delete => None,
        };

        let inserted = conn
            .prepare_cached(&self.insert_sql)
            .and_then(|mut stmt| stmt.execute(params![event.event_type.code(), event.key, value]));

        if let Err(e) = inserted {
            return Err(TxLogError::WriteFailed {
                sequence: self.last_sequence.load(Ordering::SeqCst) + 1,
                reason: e.to_string(),
            });
        }

        let sequence = conn.last_insert_rowid() as u64;
        self.last_sequence.store(sequence, Ordering::SeqCst);
        Ok(sequence)
    }

    fn sync(&mut self) -> Result<()> {
        // Every insert is its own committed transaction
        Ok(())
    }
}
