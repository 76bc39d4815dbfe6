//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind with backlog, accept, connection cap)
//!     → connection.rs (connection IDs, in-flight tracking)
//!     → Hand off to http::Dispatcher
//!
//! Connection States:
//!     Accepting → Active → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded concurrency prevents resource exhaustion under load
//! - Each connection tracked so shutdown can wait for in-flight work

pub mod connection;
pub mod listener;
