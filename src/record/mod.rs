//! Transaction record model.
//!
//! # Data Flow
//! ```text
//! submission body
//!     → decode.rs (JSON shapes → TransactionRecord, per-record isolation)
//!     → queue (owned by the queue until drained)
//!     → journal (stamped with server time, rendered with to_literal)
//! ```
//!
//! # Design Decisions
//! - Records are immutable; stamping consumes and returns a new record
//! - Client-supplied timestamps are never trusted
//! - One record always renders to exactly one line

pub mod decode;

use serde::{Deserialize, Serialize};

pub use decode::{decode_body, DecodeError, Decoded, RecordRejection};

/// A single economy transaction reported by a game server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionRecord {
    /// Opaque identifier, unique per event.
    pub transaction_id: String,
    /// Stable player key (UUID-like).
    pub player_uuid: String,
    /// Player display name.
    pub player_name: String,
    /// Transaction kind, e.g. `DEPOSIT` or `TRANSFER`. Open-ended.
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: f64,
    pub balance_before: f64,
    pub balance_after: f64,
    pub description: String,
    /// Server-assigned persistence time.
    pub timestamp: String,
}

impl TransactionRecord {
    /// Return this record with the server timestamp set.
    ///
    /// Whatever the submitter put in `timestamp` is discarded.
    pub fn stamped(self, timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            ..self
        }
    }

    /// Render the record as a single-line object literal.
    ///
    /// Field order is fixed. Numbers use the default `f64` display form,
    /// so `100.0` renders as `100` and `12.5` as `12.5`.
    pub fn to_literal(&self) -> String {
        format!(
            "{{\"transactionId\": {}, \"playerUuid\": {}, \"playerName\": {}, \"type\": {}, \
             \"amount\": {}, \"balanceBefore\": {}, \"balanceAfter\": {}, \"description\": {}, \
             \"timestamp\": {}}}",
            quote(&self.transaction_id),
            quote(&self.player_uuid),
            quote(&self.player_name),
            quote(&self.kind),
            self.amount,
            self.balance_before,
            self.balance_after,
            quote(&self.description),
            quote(&self.timestamp),
        )
    }

    /// Condensed console form: `name | type | amount`.
    pub fn summary(&self) -> String {
        format!("{} | {} | {}", self.player_name, self.kind, self.amount)
    }
}

/// JSON string literal for `s`. Escaping keeps newlines in free text from
/// splitting a log entry across lines.
fn quote(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}
