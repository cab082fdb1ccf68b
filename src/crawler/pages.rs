//! Fetching and resolving one listing page
//!
//! A page fetch:
//! 1. Derives the page URL from the catalog URL
//! 2. Serves the listing from the page cache or fetches it through the limiter
//! 3. Extracts entry stubs from the listing
//! 4. Resolves every stub concurrently, from the entry cache when possible
//!
//! Stubs settle independently: one failing entry is logged and left out,
//! the rest of the page is still returned.

use crate::cache::{EntryCache, PageCache};
use crate::catalog::{CatalogEntry, CatalogInfo, EntryStub};
use crate::config::CacheConfig;
use crate::crawler::fetcher::PageSource;
use crate::crawler::limiter::RateLimiter;
use crate::crawler::parser::MarkupExtractor;
use crate::url::page_url;
use crate::FeedError;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// Resolves listing pages into catalog entries
///
/// Cloning is cheap: every clone shares the same limiter and caches, which is
/// what lets detached tasks keep warming the caches after a crawl returns.
#[derive(Clone)]
pub struct PageFetcher {
    source: Arc<dyn PageSource>,
    extractor: Arc<dyn MarkupExtractor>,
    limiter: Arc<RateLimiter>,
    entries: Arc<EntryCache>,
    pages: Arc<PageCache>,
    entry_ttl: Option<Duration>,
    page_ttl: Option<Duration>,
}

impl PageFetcher {
    /// Creates a fetcher over shared services
    ///
    /// Entries never expire and listings are not cached until configured with
    /// [`PageFetcher::with_ttls`].
    pub fn new(
        source: Arc<dyn PageSource>,
        extractor: Arc<dyn MarkupExtractor>,
        limiter: Arc<RateLimiter>,
        entries: Arc<EntryCache>,
        pages: Arc<PageCache>,
    ) -> Self {
        Self {
            source,
            extractor,
            limiter,
            entries,
            pages,
            entry_ttl: None,
            page_ttl: None,
        }
    }

    /// Sets the entry and listing TTLs from the cache configuration
    pub fn with_ttls(mut self, config: &CacheConfig) -> Self {
        self.entry_ttl = config.entry_ttl();
        self.page_ttl = config.page_ttl();
        self
    }

    pub fn entry_cache(&self) -> &Arc<EntryCache> {
        &self.entries
    }

    pub fn page_cache(&self) -> &Arc<PageCache> {
        &self.pages
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn extractor(&self) -> &Arc<dyn MarkupExtractor> {
        &self.extractor
    }

    /// Fetches one URL through the limiter
    ///
    /// The permit is held only for the duration of the request.
    pub async fn fetch_markup(&self, url: &str) -> Result<String, FeedError> {
        let _permit = self.limiter.acquire().await?;
        self.source.fetch(url).await
    }

    /// Fetches page `page_number` of a catalog and resolves its entries
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<CatalogEntry>)` - Every entry that resolved; empty for a page
    ///   past the end of the catalog or one whose listing could not be parsed
    /// * `Err(FeedError)` - The catalog URL is malformed, or the listing could
    ///   not be fetched (network failure, HTTP error, limiter rejection)
    pub async fn fetch_page(
        &self,
        catalog_url: &str,
        page_number: u32,
    ) -> Result<Vec<CatalogEntry>, FeedError> {
        let url = page_url(catalog_url, page_number)?;
        let key = url.as_str();

        let (markup, cached) = match self.pages.get(key) {
            Some(markup) => {
                tracing::trace!("Listing cache hit for {}", key);
                (markup, true)
            }
            None => match self.fetch_markup(key).await {
                Ok(markup) => (markup, false),
                Err(FeedError::Http { status: 404, .. }) => {
                    tracing::debug!("Page {} of {} does not exist", page_number, catalog_url);
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e),
            },
        };

        let stubs = match self.extractor.extract_stubs(&markup, &url) {
            Ok(stubs) => stubs,
            Err(e) => {
                tracing::warn!("Failed to parse listing {}: {}", key, e);
                return Ok(Vec::new());
            }
        };

        if !cached {
            if let Some(ttl) = self.page_ttl {
                self.pages.put(key, markup, Some(ttl));
            }
        }

        let stub_count = stubs.len();
        let outcomes = join_all(stubs.iter().map(|stub| self.resolve_entry(stub))).await;

        let mut entries = Vec::with_capacity(stub_count);
        for (stub, outcome) in stubs.iter().zip(outcomes) {
            match outcome {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Skipping entry {} ({}): {}", stub.id, stub.url, e),
            }
        }

        tracing::debug!(
            "Page {} of {}: {}/{} entries resolved",
            page_number,
            catalog_url,
            entries.len(),
            stub_count
        );

        Ok(entries)
    }

    /// Resolves a stub into a full entry, from the cache when possible
    pub async fn resolve_entry(&self, stub: &EntryStub) -> Result<CatalogEntry, FeedError> {
        if let Some(entry) = self.entries.get(&stub.id) {
            tracing::trace!("Entry cache hit for {}", stub.id);
            return Ok(entry);
        }

        let markup = self.fetch_markup(stub.url.as_str()).await?;
        let entry = self
            .extractor
            .extract_entry(stub, &markup)
            .map_err(|source| FeedError::Parse {
                url: stub.url.to_string(),
                source,
            })?;

        self.entries.put(stub.id.clone(), entry.clone(), self.entry_ttl);
        Ok(entry)
    }

    /// Fetches catalog metadata from the first listing page
    ///
    /// The listing is cached like any other page, so the crawl that usually
    /// follows does not fetch page 1 a second time.
    pub async fn fetch_info(&self, catalog_url: &str) -> Result<CatalogInfo, FeedError> {
        let url = page_url(catalog_url, 1)?;
        let key = url.as_str();

        let markup = match self.pages.get(key) {
            Some(markup) => markup,
            None => {
                let markup = self.fetch_markup(key).await?;
                if let Some(ttl) = self.page_ttl {
                    self.pages.put(key, markup.clone(), Some(ttl));
                }
                markup
            }
        };

        self.extractor
            .extract_catalog_info(&markup)
            .map_err(|source| FeedError::Parse {
                url: key.to_string(),
                source,
            })
    }
}
