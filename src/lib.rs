//! dirtyrss: republishes paginated media catalogs as chronological feeds
//!
//! This crate implements the catalog crawler behind the feeds: it discovers how
//! many pages a catalog has, fetches them in rate-limited batches against a
//! deadline, returns whatever it gathered in time, and keeps warming a shared
//! cache in the background for the next request.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod crawler;
pub mod url;

use std::time::Duration;
use thiserror::Error;

/// Main error type for dirtyrss operations
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("Parse error for {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: ParseError,
    },

    #[error("Rate limiter rejected request after waiting {waited:?}")]
    RateLimitRejection { waited: Duration },

    #[error("Catalog {catalog_url} unavailable: {source}")]
    Fatal {
        catalog_url: String,
        #[source]
        source: Box<FeedError>,
    },

    #[error("Page size assumption must be at least 1")]
    InvalidPageSize,

    #[error("Fetch task failed: {0}")]
    Task(String),
}

impl FeedError {
    /// Returns true for failures that a later attempt may not hit again
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::RateLimitRejection { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Markup extraction errors
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("document is empty")]
    EmptyDocument,

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("no entry identifier in {0}")]
    NoIdentifier(String),
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

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

// Re-export commonly used types
pub use cache::{EntryCache, PageCache};
pub use catalog::{assemble, CatalogEntry, CatalogInfo, EntryStub};
pub use config::Config;
pub use crawler::{CatalogCrawler, CrawlOutcome, PageFetcher, RateLimiter};
