//! Shutdown coordination for the ingest server.

use tokio::sync::broadcast;

use crate::journal::ConsumerStats;
use crate::lifecycle::startup::{RunningServer, ServerState};

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that long-running tasks subscribe to.
#[derive(Debug, Clone)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    ///
    /// Subscribe before triggering; a receiver created afterwards misses it.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// What a completed shutdown left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub consumer: ConsumerStats,
    /// Connections still being served when the grace period ran out.
    pub abandoned_connections: u64,
}

impl RunningServer {
    /// Stop the server.
    ///
    /// Stops accepting, gives in-flight connections the configured grace
    /// period, then closes the queue and waits for the consumer to write
    /// every record still queued.
    pub async fn stop(mut self) -> ShutdownReport {
        self.set_state(ServerState::Stopping);

        self.accept_shutdown.trigger();
        if let Err(e) = (&mut self.accept_task).await {
            tracing::error!(error = %e, "Accept loop panicked");
        }

        let in_flight = self.tracker.active_count();
        if in_flight > 0 {
            tracing::info!(
                in_flight,
                grace = ?self.grace,
                "Waiting for in-flight connections"
            );
            let _ = tokio::time::timeout(self.grace, self.tracker.wait_idle()).await;
        }
        let abandoned_connections = self.tracker.active_count();
        if abandoned_connections > 0 {
            tracing::warn!(abandoned_connections, "Grace period expired with connections open");
        }

        self.drain_shutdown.trigger();
        let consumer = match (&mut self.consumer_task).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "Log consumer panicked");
                ConsumerStats::default()
            }
        };

        self.set_state(ServerState::Stopped);
        tracing::info!("Server stopped");

        ShutdownReport {
            consumer,
            abandoned_connections,
        }
    }
}
