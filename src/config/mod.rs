//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → IngestConfig (validated, immutable)
//!     → command-line port override applied in main
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults so an absent file means a working server
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::IngestConfig;
pub use schema::{
    JournalConfig, LimitsConfig, ListenerConfig, ObservabilityConfig, ShutdownConfig,
    TimeoutConfig,
};
