//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits sane)
//! - Validate addresses parse before anything binds
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: IngestConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::IngestConfig;
use crate::http::request::READ_BUFFER_SIZE;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &IngestConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.backlog == 0 {
        errors.push(ValidationError::new("listener.backlog", "must be greater than 0"));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new(
            "listener.max_connections",
            "must be greater than 0",
        ));
    }

    if config.timeouts.read_secs == 0 {
        errors.push(ValidationError::new("timeouts.read_secs", "must be greater than 0"));
    }
    if config.timeouts.write_secs == 0 {
        errors.push(ValidationError::new("timeouts.write_secs", "must be greater than 0"));
    }

    if config.limits.max_header_bytes < READ_BUFFER_SIZE {
        errors.push(ValidationError::new(
            "limits.max_header_bytes",
            format!("must be at least {READ_BUFFER_SIZE}"),
        ));
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new("limits.max_body_bytes", "must be greater than 0"));
    }

    if config.journal.path.trim().is_empty() {
        errors.push(ValidationError::new("journal.path", "must not be empty"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }
    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("expected one of {}", LOG_LEVELS.join(", ")),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
