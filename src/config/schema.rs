//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the ingest
//! server. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration for the ingest server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IngestConfig {
    /// Listener configuration (bind address, backlog, connection cap).
    pub listener: ListenerConfig,

    /// Per-operation deadlines on client connections.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Durable transaction log.
    pub journal: JournalConfig,

    /// Shutdown behaviour.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Listen backlog handed to the OS.
    pub backlog: u32,

    /// Maximum concurrently served connections (backpressure).
    pub max_connections: usize,
}

impl ListenerConfig {
    /// Replace the port of `bind_address`, keeping its host.
    ///
    /// Leaves an unparsable address untouched; validation reports it.
    pub fn override_port(&mut self, port: u16) {
        if let Ok(mut addr) = self.bind_address.parse::<SocketAddr>() {
            addr.set_port(port);
            self.bind_address = addr.to_string();
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            backlog: 10,
            max_connections: 1024,
        }
    }
}

/// Timeout configuration for client I/O.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for each individual read from a client, in seconds.
    pub read_secs: u64,

    /// Deadline for writing a response, in seconds.
    pub write_secs: u64,
}

impl TimeoutConfig {
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_secs: 30,
            write_secs: 10,
        }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted header block, separator included.
    pub max_header_bytes: usize,

    /// Largest accepted declared `Content-Length`.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 16 * 1024,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Durable log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Append-only log file path.
    pub path: String,

    /// Mirror each persisted record to the console.
    pub console_echo: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: "transactions.log".to_string(),
            console_echo: true,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long `stop` waits for in-flight connections before draining.
    pub grace_secs: u64,
}

impl ShutdownConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { grace_secs: 5 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
