//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the listener (fatal on failure)
//! - Open the journal (non-fatal on failure)
//! - Spawn the log consumer and the accept loop
//!
//! # Design Decisions
//! - Listener binds before anything is spawned
//! - Each accepted connection gets its own task, capped by the listener's semaphore

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::IngestConfig;
use crate::http::Dispatcher;
use crate::journal::{ConsumerStats, Journal, LogConsumer};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::observability::metrics;
use crate::queue::{self, IngestQueue};

/// Server lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Failure to bring the server up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("listener: {0}")]
    Listener(#[from] ListenerError),

    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// Handle to a started server. Call [`RunningServer::stop`] to shut it down.
pub struct RunningServer {
    pub(crate) state: ServerState,
    pub(crate) local_addr: SocketAddr,
    pub(crate) queue: IngestQueue,
    pub(crate) tracker: ConnectionTracker,
    pub(crate) grace: Duration,
    pub(crate) accept_shutdown: Shutdown,
    pub(crate) drain_shutdown: Shutdown,
    pub(crate) accept_task: JoinHandle<()>,
    pub(crate) consumer_task: JoinHandle<ConsumerStats>,
}

impl RunningServer {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Producer handle to the ingestion queue.
    pub fn queue(&self) -> IngestQueue {
        self.queue.clone()
    }

    /// Connections currently being served.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    pub(crate) fn set_state(&mut self, next: ServerState) {
        tracing::debug!(from = ?self.state, to = ?next, "Server state changed");
        self.state = next;
    }
}

/// Bring the server up according to `config`.
pub async fn start(config: &IngestConfig) -> Result<RunningServer, StartupError> {
    tracing::debug!(state = ?ServerState::Starting, "Server state changed");

    let listener = Listener::bind(&config.listener)?;
    let local_addr = listener.local_addr().map_err(StartupError::LocalAddr)?;

    let journal = Journal::open(&config.journal.path).await;
    let (queue, receiver) = queue::channel();

    let drain_shutdown = Shutdown::new();
    let consumer = LogConsumer::new(journal, config.journal.console_echo);
    let consumer_task = tokio::spawn(consumer.run(receiver, drain_shutdown.subscribe()));

    let accept_shutdown = Shutdown::new();
    let tracker = ConnectionTracker::new();
    let dispatcher = Arc::new(Dispatcher::new(config, queue.clone()));
    let accept_task = tokio::spawn(accept_loop(
        listener,
        dispatcher,
        tracker.clone(),
        accept_shutdown.subscribe(),
    ));

    tracing::info!(address = %local_addr, "Server started");

    Ok(RunningServer {
        state: ServerState::Running,
        local_addr,
        queue,
        tracker,
        grace: config.shutdown.grace(),
        accept_shutdown,
        drain_shutdown,
        accept_task,
        consumer_task,
    })
}

/// Accept until shutdown. The listening socket closes when this returns.
async fn accept_loop(
    listener: Listener,
    dispatcher: Arc<Dispatcher>,
    tracker: ConnectionTracker,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => {
                    let guard = tracker.track();
                    metrics::record_connection();

                    let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);
                    let dispatcher = Arc::clone(&dispatcher);
                    tokio::spawn(
                        async move {
                            let _permit = permit;
                            let _guard = guard;
                            dispatcher.handle(stream).await;
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                }
            }
        }
    }

    tracing::info!("Accept loop stopped");
}
