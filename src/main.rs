//! Transaction Record Server
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ net::listener ──▶ http::dispatcher ──▶ record::decode
//!                (accept,          (framing,               │
//!                 conn cap)         CORS, acks)            ▼
//!                                                      queue (mpsc)
//!                                                          │
//!                                                          ▼
//!                               console ◀── journal::LogConsumer ──▶ transactions.log
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use txn_ingest::config::loader::load_config;
use txn_ingest::config::IngestConfig;
use txn_ingest::lifecycle::{self, wait_for_stop_signal};
use txn_ingest::observability;

#[derive(Parser)]
#[command(name = "txn-ingest")]
#[command(version, about = "Receives transaction records and appends them to a durable log", long_about = None)]
struct Cli {
    /// Port to listen on; overrides the port in the configured bind address
    port: Option<u16>,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration from {}: {}", path.display(), e);
                return ExitCode::from(1);
            }
        },
        None => IngestConfig::default(),
    };
    if let Some(port) = cli.port {
        config.listener.override_port(port);
    }

    observability::logging::init(&config.observability.log_level);

    tracing::info!("txn-ingest v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        journal = %config.journal.path,
        read_timeout_secs = config.timeouts.read_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = match lifecycle::start(&config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start server");
            return ExitCode::from(1);
        }
    };

    tracing::info!(address = %server.local_addr(), "Press Ctrl+C to stop");
    wait_for_stop_signal().await;

    let report = server.stop().await;
    tracing::info!(
        persisted = report.consumer.written,
        processed = report.consumer.processed,
        abandoned_connections = report.abandoned_connections,
        "Shutdown complete"
    );
    ExitCode::SUCCESS
}
