//! Crawler module for catalog fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - Admission control for outbound requests
//! - HTTP fetching behind the [`PageSource`] trait
//! - Markup extraction behind the [`MarkupExtractor`] trait
//! - Page fetching with cache lookups
//! - Batched, deadline-bounded crawl coordination

mod coordinator;
mod fetcher;
mod limiter;
mod pages;
mod parser;
mod search;

pub use coordinator::{page_count, CatalogCrawler, CrawlOutcome, CrawlSettings};
pub use fetcher::{build_http_client, HttpPageSource, PageSource};
pub use limiter::{Permit, RateLimiter};
pub use pages::PageFetcher;
pub use parser::{parse_listing_date, IvooxExtractor, MarkupExtractor};
pub use search::{resolve_catalog, DEFAULT_SEARCH_BASE};

use crate::cache::{EntryCache, PageCache};
use crate::config::Config;
use crate::FeedError;
use std::sync::Arc;

/// Builds a crawler over fresh process-wide services
///
/// This wires together:
/// 1. A `reqwest`-backed page source with the configured user agent
/// 2. The iVoox markup extractor
/// 3. One rate limiter and one pair of caches
///
/// Call this once per process and share the crawler (it is cheap to clone);
/// building a second one would split the request budget and the caches.
pub fn build_crawler(config: &Config) -> Result<CatalogCrawler, FeedError> {
    let source = HttpPageSource::from_config(&config.user_agent)?;
    let fetcher = PageFetcher::new(
        Arc::new(source),
        Arc::new(IvooxExtractor::new()),
        Arc::new(RateLimiter::from_config(&config.crawler)),
        Arc::new(EntryCache::new()),
        Arc::new(PageCache::new()),
    )
    .with_ttls(&config.cache);

    Ok(CatalogCrawler::new(
        fetcher,
        CrawlSettings::from(&config.crawler),
    ))
}
