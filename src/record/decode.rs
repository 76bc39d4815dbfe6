//! Submission body decoding.
//!
//! Accepted shapes, in order of precedence:
//!
//! ```text
//! (empty body) or {}                         → no records
//! [ {record}, {record}, ... ]                → batch
//! {"version": 1, "records": [ ... ]}         → versioned batch
//! {record}                                   → single record
//! ```
//!
//! Each record is decoded on its own, so one malformed entry only costs
//! that entry.

use serde_json::Value;
use thiserror::Error;

use super::TransactionRecord;

/// Envelope schema version understood by this server.
pub const SCHEMA_VERSION: u64 = 1;

/// Whole-body decoding failure. The submission is answered with 400.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("body is not valid JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("unsupported schema version {0}")]
    UnsupportedVersion(String),

    #[error("expected a record object or an array of records, got {0}")]
    UnexpectedShape(&'static str),
}

/// A single entry that could not be turned into a record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRejection {
    /// Position of the entry within the submitted batch.
    pub index: usize,
    pub reason: String,
}

/// Result of decoding one submission body.
#[derive(Debug, Default)]
pub struct Decoded {
    pub records: Vec<TransactionRecord>,
    pub rejected: Vec<RecordRejection>,
}

/// Decode a submission body into transaction records.
pub fn decode_body(body: &[u8]) -> Result<Decoded, DecodeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Decoded::default());
    }

    let value: Value = serde_json::from_slice(body)?;
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut map) if map.contains_key("records") => {
            // An absent version means the current one; anything present must match exactly.
            if let Some(version) = map.get("version") {
                if version.as_u64() != Some(SCHEMA_VERSION) {
                    return Err(DecodeError::UnsupportedVersion(version.to_string()));
                }
            }
            match map.remove("records") {
                Some(Value::Array(entries)) => entries,
                Some(other) => return Err(DecodeError::UnexpectedShape(kind_of(&other))),
                None => Vec::new(),
            }
        }
        Value::Object(map) if map.is_empty() => Vec::new(),
        Value::Object(map) => vec![Value::Object(map)],
        other => return Err(DecodeError::UnexpectedShape(kind_of(&other))),
    };

    let mut decoded = Decoded::default();
    for (index, entry) in entries.into_iter().enumerate() {
        if !entry.is_object() {
            decoded.rejected.push(RecordRejection {
                index,
                reason: format!("expected an object, got {}", kind_of(&entry)),
            });
            continue;
        }
        match serde_json::from_value::<TransactionRecord>(entry) {
            Ok(record) => decoded.records.push(record),
            Err(e) => decoded.rejected.push(RecordRejection {
                index,
                reason: e.to_string(),
            }),
        }
    }

    Ok(decoded)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
