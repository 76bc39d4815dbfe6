//! Request framing.
//!
//! # Responsibilities
//! - Classify the request by its method token as soon as that token arrives
//! - Accumulate a submission's header block and read exactly `Content-Length`
//!   body bytes across as many reads as needed
//! - Bound every read with a deadline
//!
//! # Design Decisions
//! - One request per connection; bytes past the declared body are dropped
//! - Preflight and unknown requests are returned once their method is known,
//!   without waiting for the rest of the header block
//! - Only submissions are ever answered with an error status
//! - A peer closing mid-body is not an error: the short body is kept and
//!   the request marked truncated
//! - Header size and declared body size are checked before the body is read

use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::IngestConfig;
use crate::http::response::Status;

/// Size of each individual read from the socket.
pub const READ_BUFFER_SIZE: usize = 8 * 1024;

const HEADER_SEPARATOR: &[u8] = b"\r\n\r\n";
const LINE_END: &[u8] = b"\r\n";

/// What the client is asking for, judged by the method token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// `OPTIONS`: CORS probe.
    Preflight,
    /// `POST`: transaction upload.
    Submission,
    /// Anything else. Gets no response.
    Unknown,
}

impl RequestKind {
    pub fn classify(method: &str) -> Self {
        match method {
            "OPTIONS" => RequestKind::Preflight,
            "POST" => RequestKind::Submission,
            _ => RequestKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Preflight => "preflight",
            RequestKind::Submission => "submission",
            RequestKind::Unknown => "unknown",
        }
    }
}

/// One framed request.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub kind: RequestKind,
    pub method: String,
    pub path: String,
    /// Declared body length. Only read for submissions.
    pub content_length: Option<usize>,
    /// Submission body. Always empty for other kinds.
    pub body: Vec<u8>,
    /// The peer closed before the declared length arrived.
    pub truncated: bool,
}

/// Failure to frame a request.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("request headers exceed {limit} bytes")]
    HeadersTooLarge { limit: usize },

    #[error("missing Content-Length header")]
    MissingContentLength,

    #[error("invalid Content-Length value '{0}'")]
    InvalidContentLength(String),

    #[error("conflicting Content-Length values '{first}' and '{second}'")]
    ConflictingContentLength { first: usize, second: usize },

    #[error("declared body of {declared} bytes exceeds limit of {limit}")]
    BodyTooLarge { declared: usize, limit: usize },

    #[error("no data from client within {0:?}")]
    Timeout(Duration),

    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

impl FramingError {
    /// Status a submission is answered with, or `None` when the connection is unusable.
    pub fn status(&self) -> Option<Status> {
        match self {
            FramingError::HeadersTooLarge { .. } => Some(Status::HeaderFieldsTooLarge),
            FramingError::MissingContentLength => Some(Status::LengthRequired),
            FramingError::InvalidContentLength(_) => Some(Status::BadRequest),
            FramingError::ConflictingContentLength { .. } => Some(Status::BadRequest),
            FramingError::BodyTooLarge { .. } => Some(Status::PayloadTooLarge),
            FramingError::Timeout(_) => Some(Status::RequestTimeout),
            FramingError::Io(_) => None,
        }
    }
}

/// A framing failure and the kind of request it interrupted.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ReadError {
    /// `None` when the peer failed before its method token arrived.
    pub kind: Option<RequestKind>,
    #[source]
    pub error: FramingError,
}

impl ReadError {
    fn new(kind: Option<RequestKind>, error: FramingError) -> Self {
        Self { kind, error }
    }

    /// Status to answer with. Anything but a submission is closed silently.
    pub fn status(&self) -> Option<Status> {
        match self.kind {
            Some(RequestKind::Submission) => self.error.status(),
            _ => None,
        }
    }
}

/// Reads one request off a stream.
#[derive(Debug, Clone)]
pub struct FramedReader {
    read_timeout: Duration,
    max_header_bytes: usize,
    max_body_bytes: usize,
}

impl FramedReader {
    pub fn new(read_timeout: Duration, max_header_bytes: usize, max_body_bytes: usize) -> Self {
        Self {
            read_timeout,
            max_header_bytes,
            max_body_bytes,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(
            config.timeouts.read(),
            config.limits.max_header_bytes,
            config.limits.max_body_bytes,
        )
    }

    /// Read one request. `Ok(None)` means the peer closed without sending anything.
    pub async fn read<S>(&self, stream: &mut S) -> Result<Option<InboundRequest>, ReadError>
    where
        S: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut data = Vec::new();
        let mut kind = None;

        let separator = loop {
            let n = self
                .read_chunk(stream, &mut buf)
                .await
                .map_err(|error| ReadError::new(kind, error))?;
            if n == 0 {
                if data.is_empty() {
                    return Ok(None);
                }
                break None;
            }
            data.extend_from_slice(&buf[..n]);

            if kind.is_none() {
                kind = method_token(&data).map(classify_token);
            }
            if let Some(early) = kind.filter(|k| *k != RequestKind::Submission) {
                return Ok(Some(bodiless(early, &data)));
            }
            if let Some(pos) = find(&data, HEADER_SEPARATOR) {
                break Some(pos);
            }
            if data.len() > self.max_header_bytes {
                return Err(ReadError::new(
                    kind,
                    FramingError::HeadersTooLarge {
                        limit: self.max_header_bytes,
                    },
                ));
            }
        };

        // Peer closed before any whitespace: the whole fragment is the method.
        let kind = kind.unwrap_or_else(|| classify_token(trim_start(&data)));
        if kind != RequestKind::Submission {
            return Ok(Some(bodiless(kind, &data)));
        }
        let fail = |error| ReadError::new(Some(RequestKind::Submission), error);

        let (head_len, body_start) = match separator {
            Some(pos) => (pos, pos + HEADER_SEPARATOR.len()),
            None => (data.len(), data.len()),
        };
        if head_len + HEADER_SEPARATOR.len() > self.max_header_bytes {
            return Err(fail(FramingError::HeadersTooLarge {
                limit: self.max_header_bytes,
            }));
        }

        let head = String::from_utf8_lossy(&data[..head_len]).into_owned();
        let (method, path) = request_line(&data);
        let mut body = data.split_off(body_start);

        let declared = content_length(&head).map_err(fail)?;
        if declared > self.max_body_bytes {
            return Err(fail(FramingError::BodyTooLarge {
                declared,
                limit: self.max_body_bytes,
            }));
        }

        let mut truncated = false;
        while body.len() < declared {
            let n = self.read_chunk(stream, &mut buf).await.map_err(fail)?;
            if n == 0 {
                truncated = true;
                break;
            }
            body.extend_from_slice(&buf[..n]);
        }
        body.truncate(declared);

        Ok(Some(InboundRequest {
            kind,
            method,
            path,
            content_length: Some(declared),
            body,
            truncated,
        }))
    }

    async fn read_chunk<S>(&self, stream: &mut S, buf: &mut [u8]) -> Result<usize, FramingError>
    where
        S: AsyncRead + Unpin,
    {
        match tokio::time::timeout(self.read_timeout, stream.read(buf)).await {
            Ok(read) => Ok(read?),
            Err(_) => Err(FramingError::Timeout(self.read_timeout)),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn trim_start(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    &data[start..]
}

/// The method token, once whitespace after it has arrived.
fn method_token(data: &[u8]) -> Option<&[u8]> {
    let rest = trim_start(data);
    if rest.is_empty() {
        return None;
    }
    let len = rest.iter().position(u8::is_ascii_whitespace)?;
    Some(&rest[..len])
}

fn classify_token(token: &[u8]) -> RequestKind {
    RequestKind::classify(std::str::from_utf8(token).unwrap_or_default())
}

/// Method and path from whatever part of the request line has arrived.
fn request_line(data: &[u8]) -> (String, String) {
    let end = find(data, LINE_END).unwrap_or(data.len());
    let line = String::from_utf8_lossy(&data[..end]);
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or("/").to_string();
    (method, path)
}

fn bodiless(kind: RequestKind, data: &[u8]) -> InboundRequest {
    let (method, path) = request_line(data);
    InboundRequest {
        kind,
        method,
        path,
        content_length: None,
        body: Vec::new(),
        truncated: false,
    }
}

/// Value of the `Content-Length` header.
///
/// Header names match case-insensitively. Values must be plain decimal
/// digits, and repeated headers must agree.
fn content_length(head: &str) -> Result<usize, FramingError> {
    let mut declared: Option<usize> = None;
    let values = head
        .split("\r\n")
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .filter(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| value.trim());

    for value in values {
        let parsed = if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
            value.parse::<usize>().ok()
        } else {
            None
        };
        let parsed = parsed.ok_or_else(|| FramingError::InvalidContentLength(value.to_string()))?;
        match declared {
            Some(first) if first != parsed => {
                return Err(FramingError::ConflictingContentLength {
                    first,
                    second: parsed,
                });
            }
            _ => declared = Some(parsed),
        }
    }

    declared.ok_or(FramingError::MissingContentLength)
}
