//! txlogkv Server Binary
//!
//! Recovers the store from the transaction log, then serves TCP clients.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use txlogkv::config::{SyncStrategy, WriteFailurePolicy, DEFAULT_TABLE_NAME};
use txlogkv::network::Server;
use txlogkv::txlog::spawn_error_drain;
use txlogkv::{Config, Service};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    File,
    Sqlite,
}

/// txlogkv Server
#[derive(Parser, Debug)]
#[command(name = "txlogkv-server")]
#[command(about = "Key-value store backed by a replayable transaction log")]
#[command(version)]
struct Args {
    /// Transaction log backend
    #[arg(short, long, value_enum, default_value = "file")]
    backend: Backend,

    /// Log file (file backend) or database file (sqlite backend)
    #[arg(short = 'p', long, default_value = "./transaction.log")]
    log_path: PathBuf,

    /// Table name (sqlite backend)
    #[arg(short, long, default_value = DEFAULT_TABLE_NAME)]
    table: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Capacity of the pending-write queue
    #[arg(short, long, default_value = "16")]
    queue_capacity: usize,

    /// fsync the log file every N records (1 = every record)
    #[arg(long, default_value = "1")]
    sync_every: usize,

    /// Keep writing after a failed append instead of halting the writer
    #[arg(long)]
    continue_on_write_error: bool,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,txlogkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("txlogkv Server v{}", txlogkv::VERSION);
    tracing::info!("Transaction log: {:?} at {}", args.backend, args.log_path.display());
    tracing::info!("Listen address: {}", args.listen);

    let config = build_config(&args);

    // Replay must finish cleanly before any request is served
    let (service, stats) = match Service::open(&config) {
        Ok(opened) => opened,
        Err(e) => {
            tracing::error!("Failed to recover from transaction log: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        "Recovered {} events ({} live keys), continuing at sequence {}",
        stats.events_applied,
        service.store().len(),
        stats.last_sequence + 1
    );

    let write_errors = Arc::new(AtomicU64::new(0));
    let halting = config.write_failure_policy == WriteFailurePolicy::Halt;
    let counter = Arc::clone(&write_errors);
    let drain = spawn_error_drain(service.logger().err(), move |_| {
        let seen = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if halting {
            tracing::error!("Transaction logging has stopped; new writes are not durable");
        } else {
            tracing::warn!("{} transaction log writes have failed so far", seen);
        }
    });
    if let Err(e) = drain {
        tracing::error!("Failed to start error drain: {}", e);
        std::process::exit(1);
    }

    let service = Arc::new(service);
    let server = match Server::bind(config, Arc::clone(&service)) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to bind: {}", e);
            std::process::exit(1);
        }
    };

    // Ctrl-C stops the accept loop so the log is drained before exit
    let shutdown = server.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Shutdown requested");
        shutdown.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!("Failed to install Ctrl-C handler: {}", e);
    }

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = service.close() {
        tracing::error!("Failed to close transaction log: {}", e);
    }
    tracing::info!(
        write_errors = write_errors.load(Ordering::SeqCst),
        "Server stopped"
    );
}

fn build_config(args: &Args) -> Config {
    let builder = Config::builder()
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .queue_capacity(args.queue_capacity)
        .sync_strategy(match args.sync_every {
            0 | 1 => SyncStrategy::EveryWrite,
            n => SyncStrategy::EveryNEntries { count: n },
        })
        .write_failure_policy(if args.continue_on_write_error {
            WriteFailurePolicy::Continue
        } else {
            WriteFailurePolicy::Halt
        });

    let builder = match args.backend {
        Backend::File => builder.file_backend(&args.log_path),
        Backend::Sqlite => builder.sqlite_backend(&args.log_path, &args.table),
    };
    builder.build()
}
