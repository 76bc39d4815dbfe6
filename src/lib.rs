//! Transaction record ingest server.
//!
//! Accepts transaction uploads over a minimal HTTP/1.1 dialect, queues
//! them, and appends each one to a durable log from a single consumer.

pub mod config;
pub mod http;
pub mod journal;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod queue;
pub mod record;

pub use config::IngestConfig;
pub use lifecycle::{start, RunningServer, Shutdown};
pub use record::TransactionRecord;
