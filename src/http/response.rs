//! Fixed protocol responses.
//!
//! # Design Decisions
//! - Content-Length is always computed from the body that is sent
//! - Every response advertises `Connection: close`; one request per connection
//! - Error bodies are JSON so browser clients can read them like successes

use serde_json::json;

/// Body of a successful submission acknowledgment.
pub const SUCCESS_BODY: &str = r#"{"status":"success"}"#;

/// Status codes this server can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    RequestTimeout,
    LengthRequired,
    PayloadTooLarge,
    HeaderFieldsTooLarge,
    ServiceUnavailable,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::RequestTimeout => 408,
            Status::LengthRequired => 411,
            Status::PayloadTooLarge => 413,
            Status::HeaderFieldsTooLarge => 431,
            Status::ServiceUnavailable => 503,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::RequestTimeout => "Request Timeout",
            Status::LengthRequired => "Length Required",
            Status::PayloadTooLarge => "Payload Too Large",
            Status::HeaderFieldsTooLarge => "Request Header Fields Too Large",
            Status::ServiceUnavailable => "Service Unavailable",
        }
    }
}

/// A response ready to be written to the wire.
#[derive(Debug, Clone)]
pub struct Response {
    status: Status,
    headers: Vec<(&'static str, &'static str)>,
    body: String,
}

impl Response {
    /// CORS preflight answer. Empty body.
    pub fn preflight() -> Self {
        Self {
            status: Status::Ok,
            headers: vec![
                ("Access-Control-Allow-Origin", "*"),
                ("Access-Control-Allow-Methods", "POST, OPTIONS"),
                ("Access-Control-Allow-Headers", "Content-Type, Connection"),
            ],
            body: String::new(),
        }
    }

    /// Acknowledgment for an accepted submission.
    pub fn success() -> Self {
        Self::json(Status::Ok, SUCCESS_BODY.to_string())
    }

    /// JSON error answer for a rejected submission.
    pub fn error(status: Status, message: &str) -> Self {
        let body = json!({ "status": "error", "message": message }).to_string();
        Self::json(status, body)
    }

    fn json(status: Status, body: String) -> Self {
        Self {
            status,
            headers: vec![
                ("Access-Control-Allow-Origin", "*"),
                ("Content-Type", "application/json"),
            ],
            body,
        }
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Serialize status line, headers and body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status.code(),
            self.status.reason()
        );
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        out.push_str("Connection: close\r\n\r\n");
        out.push_str(&self.body);
        out.into_bytes()
    }
}
