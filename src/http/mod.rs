//! HTTP-shaped protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted TCP connection
//!     → dispatcher.rs (per-connection state machine)
//!     → request.rs (framing: headers, Content-Length, body reassembly)
//!     → record::decode (body → records) → queue
//!     → response.rs (fixed preflight/success/error answers)
//!     → Connection closed
//! ```
//!
//! Deliberately partial HTTP/1.1: one request per connection, no chunked
//! encoding, no pipelining.

pub mod dispatcher;
pub mod request;
pub mod response;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use request::{FramedReader, FramingError, InboundRequest, ReadError, RequestKind};
pub use response::{Response, Status};
