//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, stdout console)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → Operator console (fmt layer)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Every connection runs inside a span carrying its connection ID
//! - Metric updates are fire-and-forget; no recorder installed means no-op

pub mod logging;
pub mod metrics;
