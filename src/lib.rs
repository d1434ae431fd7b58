//! Sitegrab: a recursive website archiver
//!
//! This crate implements a crawl engine that walks a website breadth-first with a
//! bounded pool of fetch workers, deduplicates URLs and payloads in a persistent
//! index, and writes every response into segmented WARC files.

pub mod archive;
pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sitegrab operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition {
        from: state::SessionState,
        to: state::SessionState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlError {
    /// Returns true if the error must stop the whole crawl
    ///
    /// Only storage and configuration failures are fatal; everything that
    /// happens while fetching or parsing a single URL is isolated to that task.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Storage(_) | Self::Io(_) | Self::InvalidTransition { .. }
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sitegrab operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::PolicyConfig;
pub use crawler::{CancelHandle, CrawlHook, CrawlOutcome, CrawlReport, Session};
pub use state::SessionState;
pub use url::{normalize_url, Fingerprint, Scope};
