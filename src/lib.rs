//! Arena-Stats: match history ingestion for a rate-limited game API
//!
//! This crate crawls the developer API of an online arena game, starting from
//! a handful of seed players and expanding breadth-first through the players
//! they shared matches with. Results are persisted to SQLite and optionally
//! exported as partitioned JSON-lines datasets.

pub mod api;
pub mod config;
pub mod crawler;
pub mod export;
pub mod storage;

use thiserror::Error;

/// Main error type for Arena-Stats operations
#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] api::TransportError),

    #[error("Fatal API outcome: {0}")]
    Fatal(#[from] api::FatalCause),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Export error: {0}")]
    Export(#[from] export::ExportError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No seeds provided; specify at least one nickname or uid")]
    NoSeeds,

    #[error("Seed nickname '{0}' did not resolve to any identity")]
    SeedUnresolved(String),

    #[error("Metadata catalog refresh failed and --require-metadata-refresh is set")]
    MetadataRefresh,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Arena-Stats operations
pub type Result<T> = std::result::Result<T, ArenaError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use api::{AmbiguityReason, ApiClient, Classification, Endpoint, FatalCause};
pub use config::Config;
pub use crawler::{IngestionManager, IngestionSummary};
