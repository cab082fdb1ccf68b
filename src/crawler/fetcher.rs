//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests for listing and detail pages
//! - Error classification into network and HTTP status failures
//!
//! Fetching never retries on its own: a failed page is retried by the next
//! batch or by the background continuation.

use crate::config::UserAgentConfig;
use crate::FeedError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Source of raw page markup
///
/// The crawler only ever talks to the network through this trait, which keeps
/// tests free to substitute canned pages.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetches the markup at `url`
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The response body
    /// * `Err(FeedError::Http)` - The server answered with a non-success status
    /// * `Err(FeedError::Network)` - The request failed in transit
    async fn fetch(&self, url: &str) -> Result<String, FeedError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Example
///
/// ```no_run
/// use dirtyrss::config::UserAgentConfig;
/// use dirtyrss::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`PageSource`] backed by a `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: Client,
}

impl HttpPageSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a source with a client configured from `config`
    pub fn from_config(config: &UserAgentConfig) -> Result<Self, FeedError> {
        let client = build_http_client(config).map_err(|e| FeedError::Network {
            url: String::new(),
            message: format!("failed to build HTTP client: {}", e),
        })?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch(&self, url: &str) -> Result<String, FeedError> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| FeedError::Network {
            url: url.to_string(),
            message: format!("failed to read body: {}", e),
        })
    }
}

/// Maps a transport error to a [`FeedError::Network`] with a short description
fn classify_error(url: &str, error: &reqwest::Error) -> FeedError {
    let message = if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        "Connection refused".to_string()
    } else {
        error.to_string()
    };

    FeedError::Network {
        url: url.to_string(),
        message,
    }
}
