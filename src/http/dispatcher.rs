//! Per-connection request dispatch.
//!
//! # States
//! ```text
//! AwaitingRequest → Classified{Preflight | Submission | Unknown} → Responded → Closed
//! ```
//!
//! Every path ends in `Closed`: the stream is shut down and dropped once,
//! whether or not a response was written.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::config::IngestConfig;
use crate::http::request::{FramedReader, InboundRequest, RequestKind};
use crate::http::response::{Response, Status};
use crate::observability::metrics;
use crate::queue::IngestQueue;
use crate::record::decode_body;

/// How a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Closed without a response (empty read, unknown method, broken stream).
    Closed,
    /// CORS preflight answered.
    Preflight,
    /// Submission acknowledged.
    Submitted {
        bytes: usize,
        accepted: usize,
        rejected: usize,
    },
    /// Submission refused with an error status.
    Rejected { status: Status },
}

/// Serves one request per connection and feeds decoded records to the queue.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    reader: FramedReader,
    queue: IngestQueue,
    write_timeout: Duration,
}

impl Dispatcher {
    pub fn new(config: &IngestConfig, queue: IngestQueue) -> Self {
        Self {
            reader: FramedReader::from_config(config),
            queue,
            write_timeout: config.timeouts.write(),
        }
    }

    /// Handle a connection to completion and close it.
    pub async fn handle<S>(&self, mut stream: S) -> DispatchOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let outcome = self.serve(&mut stream).await;
        let _ = stream.shutdown().await;
        tracing::debug!(?outcome, "Connection closed");
        outcome
    }

    async fn serve<S>(&self, stream: &mut S) -> DispatchOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = match self.reader.read(stream).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                tracing::debug!("Peer closed before sending a request");
                return DispatchOutcome::Closed;
            }
            Err(e) => {
                let Some(status) = e.status() else {
                    tracing::debug!(
                        error = %e,
                        kind = e.kind.map(|k| k.as_str()),
                        "Closing connection without a response"
                    );
                    return DispatchOutcome::Closed;
                };
                tracing::warn!(error = %e, status = status.code(), "Rejecting malformed request");
                return self.reject(stream, status, &e.to_string()).await;
            }
        };

        match request.kind {
            RequestKind::Preflight => {
                self.respond(stream, Response::preflight()).await;
                metrics::record_request(request.kind.as_str(), Status::Ok.code());
                DispatchOutcome::Preflight
            }
            RequestKind::Submission => self.submit(stream, request).await,
            RequestKind::Unknown => {
                tracing::debug!(method = %request.method, "Ignoring unsupported request");
                metrics::record_request(request.kind.as_str(), 0);
                DispatchOutcome::Closed
            }
        }
    }

    async fn submit<S>(&self, stream: &mut S, request: InboundRequest) -> DispatchOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let bytes = request.body.len();
        tracing::info!(path = %request.path, "Received {} bytes", bytes);
        if request.truncated {
            tracing::warn!(
                received = bytes,
                declared = ?request.content_length,
                "Peer closed before the full body arrived"
            );
        }

        let decoded = match decode_body(&request.body) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(error = %e, "Rejecting undecodable submission");
                return self.reject(stream, Status::BadRequest, &e.to_string()).await;
            }
        };

        for rejection in &decoded.rejected {
            tracing::warn!(
                index = rejection.index,
                reason = %rejection.reason,
                "Skipping malformed record"
            );
        }
        let rejected = decoded.rejected.len();
        metrics::record_rejected(rejected);

        let accepted = decoded.records.len();
        if let Err(e) = self.queue.push_batch(decoded.records) {
            tracing::warn!(error = %e, records = accepted, "Refusing submission during shutdown");
            return self
                .reject(stream, Status::ServiceUnavailable, "server is shutting down")
                .await;
        }
        metrics::record_enqueued(accepted);

        tracing::debug!(accepted, rejected, "Submission queued");
        self.respond(stream, Response::success()).await;
        metrics::record_request(RequestKind::Submission.as_str(), Status::Ok.code());

        DispatchOutcome::Submitted {
            bytes,
            accepted,
            rejected,
        }
    }

    /// Answer a submission with an error. Other kinds never reach here.
    async fn reject<S>(&self, stream: &mut S, status: Status, message: &str) -> DispatchOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.respond(stream, Response::error(status, message)).await;
        metrics::record_request(RequestKind::Submission.as_str(), status.code());
        DispatchOutcome::Rejected { status }
    }

    async fn respond<S>(&self, stream: &mut S, response: Response)
    where
        S: AsyncWrite + Unpin,
    {
        let bytes = response.to_bytes();
        let write = async {
            stream.write_all(&bytes).await?;
            stream.flush().await
        };
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "Failed to write response"),
            Err(_) => tracing::warn!(timeout = ?self.write_timeout, "Response write timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{self, QueueReceiver};
    use tokio::io::AsyncReadExt;

    fn dispatcher() -> (Dispatcher, QueueReceiver) {
        let (queue, rx) = queue::channel();
        (Dispatcher::new(&IngestConfig::default(), queue), rx)
    }

    /// Run one exchange over an in-memory pipe and return the outcome and raw reply.
    async fn exchange(dispatcher: &Dispatcher, request: &[u8]) -> (DispatchOutcome, String) {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        client.write_all(request).await.unwrap();
        client.shutdown().await.unwrap();

        let outcome = dispatcher.handle(server).await;
        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();
        (outcome, reply)
    }

    /// Send a request without closing the client side, as a stalled peer would.
    async fn exchange_held_open(
        dispatcher: &Dispatcher,
        request: &[u8],
    ) -> (DispatchOutcome, String) {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        client.write_all(request).await.unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(2), dispatcher.handle(server))
            .await
            .expect("dispatcher waited on a stalled peer");
        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();
        (outcome, reply)
    }

    #[tokio::test]
    async fn preflight_gets_cors_headers() {
        let (dispatcher, _rx) = dispatcher();
        let (outcome, reply) = exchange(&dispatcher, b"OPTIONS /x HTTP/1.1\r\n\r\n").await;
        assert_eq!(outcome, DispatchOutcome::Preflight);
        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(reply.contains("Access-Control-Allow-Methods: POST, OPTIONS\r\n"));
        assert!(reply.ends_with("Content-Length: 0\r\nConnection: close\r\n\r\n"));
    }

    #[tokio::test]
    async fn submission_enqueues_records() {
        let (dispatcher, mut rx) = dispatcher();
        let body = r#"[{"transactionId":"a","playerName":"Ann"},{"transactionId":"b"}]"#;
        let request = format!(
            "POST /transactions HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let (outcome, reply) = exchange(&dispatcher, request.as_bytes()).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Submitted {
                bytes: body.len(),
                accepted: 2,
                rejected: 0
            }
        );
        assert!(reply.ends_with(r#"{"status":"success"}"#));

        let batch = rx.drain_all().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].player_name, "Ann");
    }

    #[tokio::test]
    async fn empty_submission_succeeds_without_records() {
        let (dispatcher, rx) = dispatcher();
        let (outcome, reply) =
            exchange(&dispatcher, b"POST / HTTP/1.1\r\nContent-Length: 0\r\n\r\n").await;
        assert_eq!(
            outcome,
            DispatchOutcome::Submitted {
                bytes: 0,
                accepted: 0,
                rejected: 0
            }
        );
        assert!(reply.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(rx.pending(), 0);
    }

    #[tokio::test]
    async fn partially_bad_batch_still_succeeds() {
        let (dispatcher, rx) = dispatcher();
        let body = r#"[{"transactionId":"a"},{"amount":"NaN please"}]"#;
        let request = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}", body.len(), body);
        let (outcome, _) = exchange(&dispatcher, request.as_bytes()).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Submitted {
                bytes: body.len(),
                accepted: 1,
                rejected: 1
            }
        );
        assert_eq!(rx.pending(), 1);
    }

    #[tokio::test]
    async fn undecodable_body_is_400() {
        let (dispatcher, _rx) = dispatcher();
        let (outcome, reply) =
            exchange(&dispatcher, b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\n{{{{").await;
        assert_eq!(
            outcome,
            DispatchOutcome::Rejected {
                status: Status::BadRequest
            }
        );
        assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn missing_length_is_411() {
        let (dispatcher, _rx) = dispatcher();
        let (outcome, reply) = exchange(&dispatcher, b"POST / HTTP/1.1\r\n\r\n[]").await;
        assert_eq!(
            outcome,
            DispatchOutcome::Rejected {
                status: Status::LengthRequired
            }
        );
        assert!(reply.starts_with("HTTP/1.1 411 Length Required\r\n"));
    }

    #[tokio::test]
    async fn unknown_and_empty_get_no_response() {
        let (dispatcher, _rx) = dispatcher();
        let (outcome, reply) = exchange(&dispatcher, b"GET / HTTP/1.1\r\n\r\n").await;
        assert_eq!(outcome, DispatchOutcome::Closed);
        assert!(reply.is_empty());

        let (outcome, reply) = exchange(&dispatcher, b"").await;
        assert_eq!(outcome, DispatchOutcome::Closed);
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn unknown_method_never_gets_an_error_status() {
        let (dispatcher, _rx) = dispatcher();
        let mut request = b"GET / HTTP/1.1\r\nX-Filler: ".to_vec();
        request.extend(std::iter::repeat(b'x').take(20 * 1024));
        let (outcome, reply) = exchange(&dispatcher, &request).await;
        assert_eq!(outcome, DispatchOutcome::Closed);
        assert!(reply.is_empty(), "reply: {reply}");

        let (outcome, reply) =
            exchange_held_open(&dispatcher, b"GET / HTTP/1.1\r\nHost: x\r\n").await;
        assert_eq!(outcome, DispatchOutcome::Closed);
        assert!(reply.is_empty(), "reply: {reply}");
    }

    #[tokio::test]
    async fn incomplete_preflight_is_answered_immediately() {
        let (dispatcher, _rx) = dispatcher();
        let (outcome, reply) =
            exchange_held_open(&dispatcher, b"OPTIONS / HTTP/1.1\r\nHost: x\r\n").await;
        assert_eq!(outcome, DispatchOutcome::Preflight);
        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn refused_batch_leaves_nothing_queued() {
        let (dispatcher, mut rx) = dispatcher();
        rx.close();
        let body = r#"[{"transactionId":"r1"},{"transactionId":"r2"},{"transactionId":"r3"}]"#;
        let request = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}", body.len(), body);
        let (outcome, _) = exchange(&dispatcher, request.as_bytes()).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Rejected {
                status: Status::ServiceUnavailable
            }
        );
        assert_eq!(rx.pending(), 0);
        assert!(rx.drain_all().await.is_none());
    }

    #[tokio::test]
    async fn closed_queue_is_503() {
        let (dispatcher, mut rx) = dispatcher();
        rx.close();
        let body = r#"{"transactionId":"late"}"#;
        let request = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}", body.len(), body);
        let (outcome, reply) = exchange(&dispatcher, request.as_bytes()).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Rejected {
                status: Status::ServiceUnavailable
            }
        );
        assert!(reply.starts_with("HTTP/1.1 503 Service Unavailable\r\n"));
    }
}
