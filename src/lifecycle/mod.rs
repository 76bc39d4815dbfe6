//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind listener → Open journal → Spawn consumer → Spawn accept loop
//!
//! Shutdown (shutdown.rs):
//!     Stop accepting → Grace period for in-flight connections
//!     → Close queue → Drain consumer → Close journal
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: listener first, so a bind failure leaves nothing running
//! - Ordered shutdown: stop accept, let connections finish, drain, close
//! - Queued records are never dropped on a clean shutdown

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownReport};
pub use signals::wait_for_stop_signal;
pub use startup::{start, RunningServer, ServerState, StartupError};
