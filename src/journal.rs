//! Durable transaction log and its single consumer.
//!
//! # Responsibilities
//! - Append one stamped line per record to the log file, flushing each time
//! - Mirror a condensed line per record to the console
//! - Drain everything already queued before exiting on shutdown
//!
//! # Design Decisions
//! - The log file is optional: failing to open it downgrades to console-only
//! - Timestamps are taken when the record is written, not when it arrived

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;

use crate::observability::metrics;
use crate::queue::QueueReceiver;
use crate::record::TransactionRecord;

/// Timestamp format used for log lines and record stamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local wall-clock time in [`TIMESTAMP_FORMAT`].
pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Append-only log file.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: Option<File>,
}

impl Journal {
    /// Open `path` for appending, creating it if needed.
    ///
    /// Never fails: an unopenable file leaves the journal console-only.
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let file = match OpenOptions::new().create(true).append(true).open(&path).await {
            Ok(file) => {
                tracing::info!(path = %path.display(), "Transaction log opened");
                Some(file)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to open transaction log, continuing console-only"
                );
                None
            }
        };
        Self { path, file }
    }

    /// A journal that only echoes to the console.
    pub fn console_only() -> Self {
        Self {
            path: PathBuf::new(),
            file: None,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.file.is_some()
    }

    /// Append one line and flush. No-op without a file.
    pub async fn append(&mut self, line: &str) -> io::Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        file.write_all(&buf).await?;
        file.flush().await
    }

    /// Flush outstanding data to disk and release the file.
    pub async fn close(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.sync_all().await {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to sync transaction log");
            }
        }
    }
}

/// Totals reported by the consumer when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Records taken off the queue.
    pub processed: u64,
    /// Records written to the log file.
    pub written: u64,
    pub write_failures: u64,
}

/// The single task that drains the queue into the journal.
#[derive(Debug)]
pub struct LogConsumer {
    journal: Journal,
    console_echo: bool,
    stats: ConsumerStats,
}

impl LogConsumer {
    pub fn new(journal: Journal, console_echo: bool) -> Self {
        Self {
            journal,
            console_echo,
            stats: ConsumerStats::default(),
        }
    }

    /// Persist records until shutdown is signalled and the queue is empty.
    ///
    /// On the signal the queue is closed to new pushes and whatever is
    /// still pending is written before returning.
    pub async fn run(
        mut self,
        mut queue: QueueReceiver,
        mut shutdown: broadcast::Receiver<()>,
    ) -> ConsumerStats {
        let mut stopping = false;

        loop {
            let batch = if stopping {
                queue.drain_all().await
            } else {
                tokio::select! {
                    batch = queue.drain_all() => batch,
                    _ = shutdown.recv() => {
                        stopping = true;
                        queue.close();
                        tracing::info!(pending = queue.pending(), "Draining transaction queue");
                        continue;
                    }
                }
            };

            let Some(batch) = batch else { break };
            for record in batch {
                self.persist(record).await;
            }
        }

        self.journal.close().await;
        tracing::info!(
            processed = self.stats.processed,
            written = self.stats.written,
            write_failures = self.stats.write_failures,
            "Log consumer stopped"
        );
        self.stats
    }

    async fn persist(&mut self, record: TransactionRecord) {
        let now = timestamp_now();
        let record = record.stamped(now.clone());
        let line = format!("[{}] {}", now, record.to_literal());

        self.stats.processed += 1;
        match self.journal.append(&line).await {
            Ok(()) if self.journal.is_persistent() => {
                self.stats.written += 1;
                metrics::record_persisted();
            }
            Ok(()) => {}
            Err(e) => {
                self.stats.write_failures += 1;
                tracing::error!(
                    transaction_id = %record.transaction_id,
                    error = %e,
                    "Failed to write transaction log"
                );
            }
        }

        if self.console_echo {
            tracing::info!(
                transaction_id = %record.transaction_id,
                "Transaction: {}",
                record.summary()
            );
        }
    }
}
