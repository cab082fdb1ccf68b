use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for dirtyrss
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Requests granted per rolling second
    pub requests_per_second: u32,

    /// Multiplier applied to the rate to derive the in-flight request cap
    pub concurrency_multiplier: f64,

    /// Longest a request may queue for a permit before being rejected (milliseconds)
    pub max_delay_ms: u64,

    /// Deadline for one synchronous crawl (milliseconds)
    pub timeout_ms: u64,

    /// Number of pages fetched concurrently as one batch
    pub batch_size: usize,

    /// Assumed number of entries per listing page
    pub page_size: usize,

    /// Hard upper bound on the number of pages of a single catalog
    pub max_pages: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5,
            concurrency_multiplier: 1.2,
            max_delay_ms: 30_000,
            timeout_ms: 8_000,
            batch_size: 4,
            page_size: 20,
            max_pages: 999,
        }
    }
}

impl CrawlerConfig {
    /// Maximum number of requests outstanding at once
    pub fn concurrency_cap(&self) -> usize {
        let cap = (f64::from(self.requests_per_second) * self.concurrency_multiplier).ceil();
        (cap as usize).max(1)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Cache lifetime configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CacheConfig {
    /// TTL for resolved entries in seconds; 0 keeps them for the process lifetime
    pub entry_ttl_secs: u64,

    /// TTL for listing pages in seconds; 0 disables listing caching
    pub page_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entry_ttl_secs: 0,
            page_ttl_secs: 30 * 60,
        }
    }
}

impl CacheConfig {
    /// Entry TTL, `None` meaning entries never expire
    pub fn entry_ttl(&self) -> Option<Duration> {
        match self.entry_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Listing TTL, `None` meaning listings are not cached
    pub fn page_ttl(&self) -> Option<Duration> {
        match self.page_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "dirtyrss".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://github.com/dirtyrss/dirtyrss".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Formats the User-Agent header value: `Name/Version (+ContactURL)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}
