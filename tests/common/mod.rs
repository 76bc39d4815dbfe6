//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing_subscriber::fmt::MakeWriter;

use txn_ingest::IngestConfig;

/// Config bound to an ephemeral loopback port, logging to `log_path`.
pub fn test_config(log_path: &Path) -> IngestConfig {
    let mut config = IngestConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.journal.path = log_path.display().to_string();
    config.journal.console_echo = false;
    config.timeouts.read_secs = 5;
    config.shutdown.grace_secs = 2;
    config
}

/// Send raw bytes and read until the server closes the connection.
pub async fn send_raw(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    read_reply(&mut stream).await
}

/// Read everything the server sends until it closes.
pub async fn read_reply(stream: &mut TcpStream) -> String {
    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut reply))
        .await
        .expect("server never closed the connection")
        .unwrap();
    String::from_utf8(reply).unwrap()
}

/// A POST request carrying `body` with a correct Content-Length.
pub fn post(body: &str) -> Vec<u8> {
    format!(
        "POST /transactions HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
    .into_bytes()
}

/// JSON for one record with the given id.
pub fn record_json(id: &str) -> String {
    format!(
        r#"{{"transactionId":"{id}","playerUuid":"4b1c0d4e-0000-4000-8000-000000000001","playerName":"Tester","type":"DEPOSIT","amount":10.5,"balanceBefore":0,"balanceAfter":10.5,"description":"integration"}}"#
    )
}

/// Lines currently in the log file.
pub fn read_log(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Body of an HTTP reply (everything after the header block).
pub fn body_of(reply: &str) -> &str {
    reply.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or("")
}

/// Send raw bytes and collect whatever arrives, tolerating a reset
/// from a server that hangs up without reading everything.
pub async fn send_raw_lenient(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let _ = stream.write_all(request).await;

    let mut reply = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let read = tokio::time::timeout(Duration::from_secs(10), stream.read(&mut buf))
            .await
            .expect("server never closed the connection");
        match read {
            Ok(0) | Err(_) => break,
            Ok(n) => reply.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&reply).into_owned()
}

/// In-memory sink for formatted tracing output.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Route tracing output on the current thread here until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
