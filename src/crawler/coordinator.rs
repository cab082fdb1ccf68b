//! Crawler coordinator - catalog crawl orchestration
//!
//! This module contains the crawl loop, which:
//! - Computes how many listing pages a catalog has
//! - Fetches the pages in sequential batches of concurrent page fetches
//! - Races every batch against one deadline for the whole crawl
//! - Returns whatever was gathered when the deadline fires or a later batch fails
//! - Hands unfinished pages to a detached task that only warms the caches
//!
//! A crawl moves through `FetchingBatch -> (next batch | DeadlineExceeded) ->
//! Assembling -> Done`. The background continuation runs on its own and is
//! never joined by the caller.

use crate::catalog::{assemble, CatalogEntry, CatalogInfo};
use crate::config::CrawlerConfig;
use crate::crawler::pages::PageFetcher;
use crate::FeedError;
use futures::future::{join_all, JoinAll};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

type PageResult = Result<Vec<CatalogEntry>, FeedError>;

/// Page tasks of one batch, in page order
type PendingBatch = Pin<Box<JoinAll<JoinHandle<PageResult>>>>;

/// Tunables of a crawl
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Pages fetched concurrently per batch
    pub batch_size: usize,

    /// Deadline of the synchronous crawl, started once per call
    pub timeout: Duration,

    /// Hard cap on the computed page count
    pub max_pages: u32,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self::from(&CrawlerConfig::default())
    }
}

impl From<&CrawlerConfig> for CrawlSettings {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            timeout: config.timeout(),
            max_pages: config.max_pages.max(1),
        }
    }
}

/// What a crawl gathered before returning
#[derive(Debug, Clone, Default)]
pub struct CrawlOutcome {
    /// Deduplicated entries, newest first
    pub entries: Vec<CatalogEntry>,

    /// Whether the deadline cut the crawl short
    pub deadline_exceeded: bool,

    /// Pages the crawl planned to fetch
    pub pages_planned: u32,

    /// Pages whose results made it into `entries`
    pub pages_completed: u32,

    /// Pages handed to the background continuation, in page order
    ///
    /// This includes the batch that was still in flight when the deadline
    /// fired; the continuation waits for those tasks instead of restarting them.
    pub handed_off: Vec<u32>,
}

/// Per-call crawl state; dropped after assembly
struct CrawlSession {
    catalog_url: String,
    deadline: Instant,
    entries: Vec<CatalogEntry>,
    pages_completed: u32,
    deadline_exceeded: bool,
}

/// Decrements the background task counter when the task ends, even on panic
struct BackgroundGuard(Arc<AtomicUsize>);

impl Drop for BackgroundGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Computes the number of listing pages to request
///
/// One page more than the entry count suggests is requested, since advertised
/// totals are often stale; pages past the end come back empty.
///
/// # Examples
///
/// ```
/// use dirtyrss::crawler::page_count;
///
/// assert_eq!(page_count(45, 20, 999).unwrap(), 4);
/// assert_eq!(page_count(1_000_000, 10, 999).unwrap(), 999);
/// ```
pub fn page_count(total_entries: usize, page_size: usize, max_pages: u32) -> Result<u32, FeedError> {
    if page_size == 0 {
        return Err(FeedError::InvalidPageSize);
    }
    let pages = total_entries.div_ceil(page_size).saturating_add(1);
    Ok(u32::try_from(pages).unwrap_or(u32::MAX).min(max_pages))
}

/// Orchestrates catalog crawls over a shared [`PageFetcher`]
#[derive(Clone)]
pub struct CatalogCrawler {
    fetcher: PageFetcher,
    settings: CrawlSettings,
    background: Arc<AtomicUsize>,
}

impl CatalogCrawler {
    /// Creates a crawler
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Page fetcher over the process-wide limiter and caches
    /// * `settings` - Batch size, deadline and page cap
    pub fn new(fetcher: PageFetcher, settings: CrawlSettings) -> Self {
        Self {
            fetcher,
            settings,
            background: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fetcher(&self) -> &PageFetcher {
        &self.fetcher
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// Number of detached background continuations still running
    pub fn background_in_flight(&self) -> usize {
        self.background.load(Ordering::SeqCst)
    }

    /// Fetches catalog metadata from the first listing page
    pub async fn fetch_info(&self, catalog_url: &str) -> Result<CatalogInfo, FeedError> {
        self.fetcher.fetch_info(catalog_url).await
    }

    /// Crawls a catalog and returns its entries, newest first
    ///
    /// The result may be incomplete when the deadline fires; that is not an
    /// error. See [`CatalogCrawler::crawl_session`] for the details.
    ///
    /// # Arguments
    ///
    /// * `catalog_url` - URL of the catalog's first listing page
    /// * `total_known_entries` - Entry count advertised by the source, possibly stale
    /// * `page_size` - Entries assumed per listing page
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<CatalogEntry>)` - Deduplicated entries sorted by publication date descending
    /// * `Err(FeedError::Fatal)` - The first batch failed and nothing was gathered
    pub async fn crawl(
        &self,
        catalog_url: &str,
        total_known_entries: usize,
        page_size: usize,
    ) -> Result<Vec<CatalogEntry>, FeedError> {
        self.crawl_session(catalog_url, total_known_entries, page_size)
            .await
            .map(|outcome| outcome.entries)
    }

    /// Crawls a catalog and reports how the crawl went
    ///
    /// This method:
    /// 1. Starts the deadline timer
    /// 2. Computes the page count and splits pages 1..=N into batches
    /// 3. Runs batches in page order, each one raced against the deadline
    /// 4. On deadline expiry, or a page failure once something was gathered,
    ///    stops and hands unfinished pages to the background continuation
    /// 5. Deduplicates and sorts the gathered entries
    ///
    /// Tasks of the batch that was running when the deadline fired are not
    /// cancelled; the background continuation waits for them so their results
    /// still reach the caches.
    pub async fn crawl_session(
        &self,
        catalog_url: &str,
        total_known_entries: usize,
        page_size: usize,
    ) -> Result<CrawlOutcome, FeedError> {
        let mut session = CrawlSession {
            catalog_url: catalog_url.to_string(),
            deadline: Instant::now() + self.settings.timeout,
            entries: Vec::new(),
            pages_completed: 0,
            deadline_exceeded: false,
        };

        let total_pages = page_count(total_known_entries, page_size, self.settings.max_pages)?;

        let purged = self.fetcher.page_cache().purge_expired();
        if purged > 0 {
            tracing::debug!("Purged {} expired listings", purged);
        }
        let pages: Vec<u32> = (1..=total_pages).collect();
        let batches: Vec<&[u32]> = pages.chunks(self.settings.batch_size).collect();

        tracing::info!(
            "Crawling {}: {} pages in {} batches (~{} entries known)",
            catalog_url,
            total_pages,
            batches.len(),
            total_known_entries
        );

        let mut handed_off: Vec<u32> = Vec::new();
        // Pages of the in-flight batch also appear at the front of `handed_off`.
        let mut orphaned: Option<(Vec<u32>, PendingBatch)> = None;

        for (index, batch) in batches.iter().enumerate() {
            let mut pending = self.spawn_batch(&session.catalog_url, batch);

            let results = match tokio::time::timeout_at(session.deadline, &mut pending).await {
                Ok(results) => results,
                Err(_) => {
                    tracing::info!(
                        "Deadline of {:?} exceeded during batch {} of {} for {}",
                        self.settings.timeout,
                        index + 1,
                        batches.len(),
                        catalog_url
                    );
                    session.deadline_exceeded = true;
                    orphaned = Some((batch.to_vec(), pending));
                    handed_off = batches[index..].concat();
                    break;
                }
            };

            let mut retry: Vec<u32> = Vec::new();
            let mut first_error: Option<FeedError> = None;
            for (&page, joined) in batch.iter().zip(results) {
                match flatten_join(joined) {
                    Ok(entries) => {
                        session.pages_completed += 1;
                        session.entries.extend(entries);
                    }
                    Err(e) => {
                        if e.is_transient() {
                            tracing::warn!("Page {} of {} failed: {}", page, catalog_url, e);
                            retry.push(page);
                        } else {
                            tracing::warn!(
                                "Page {} of {} failed permanently: {}",
                                page,
                                catalog_url,
                                e
                            );
                        }
                        first_error.get_or_insert(e);
                    }
                }
            }

            if let Some(error) = first_error {
                if index == 0 && session.entries.is_empty() {
                    return Err(FeedError::Fatal {
                        catalog_url: session.catalog_url,
                        source: Box::new(error),
                    });
                }

                tracing::info!(
                    "Stopping crawl of {} after batch {} with {} entries",
                    catalog_url,
                    index + 1,
                    session.entries.len()
                );
                // Only transient failures are retried.
                handed_off = retry;
                handed_off.extend(batches[index + 1..].concat());
                break;
            }
        }

        if !handed_off.is_empty() {
            let in_flight = orphaned.as_ref().map_or(0, |(batch, _)| batch.len());
            let remaining = handed_off[in_flight..].to_vec();
            self.continue_in_background(session.catalog_url.clone(), remaining, orphaned);
        }

        let entries = assemble(session.entries);
        tracing::info!(
            "Crawl of {} returned {} entries from {}/{} pages{}",
            catalog_url,
            entries.len(),
            session.pages_completed,
            total_pages,
            if session.deadline_exceeded {
                " (deadline exceeded)"
            } else {
                ""
            }
        );

        Ok(CrawlOutcome {
            entries,
            deadline_exceeded: session.deadline_exceeded,
            pages_planned: total_pages,
            pages_completed: session.pages_completed,
            handed_off,
        })
    }

    /// Spawns one task per page so they run independently of the caller
    fn spawn_batch(&self, catalog_url: &str, batch: &[u32]) -> PendingBatch {
        let handles = batch.iter().map(|&page| {
            let fetcher = self.fetcher.clone();
            let catalog_url = catalog_url.to_string();
            tokio::spawn(async move {
                tracing::debug!("Fetching page {} of {}", page, catalog_url);
                fetcher.fetch_page(&catalog_url, page).await
            })
        });
        Box::pin(join_all(handles))
    }

    /// Keeps fetching after the caller has been answered, to warm the caches
    ///
    /// The task first drains the batch that was in flight (if any), then
    /// fetches `pages` batch by batch with no deadline. Failures are logged and
    /// never reach a caller. Only the shared caches receive its results.
    fn continue_in_background(
        &self,
        catalog_url: String,
        pages: Vec<u32>,
        in_flight: Option<(Vec<u32>, PendingBatch)>,
    ) {
        let fetcher = self.fetcher.clone();
        let batch_size = self.settings.batch_size;

        self.background.fetch_add(1, Ordering::SeqCst);
        let guard = BackgroundGuard(Arc::clone(&self.background));

        tracing::info!(
            "Starting background continuation for {} ({} pages remaining)",
            catalog_url,
            pages.len()
        );

        tokio::spawn(async move {
            let _guard = guard;
            let mut warmed = 0usize;
            let mut failures = 0usize;

            if let Some((batch, pending)) = in_flight {
                for (page, joined) in batch.iter().zip(pending.await) {
                    match flatten_join(joined) {
                        Ok(entries) => warmed += entries.len(),
                        Err(e) => {
                            failures += 1;
                            tracing::warn!("Background page {} of {} failed: {}", page, catalog_url, e);
                        }
                    }
                }
            }

            for batch in pages.chunks(batch_size) {
                let results = join_all(
                    batch
                        .iter()
                        .map(|&page| fetcher.fetch_page(&catalog_url, page)),
                )
                .await;

                for (page, result) in batch.iter().zip(results) {
                    match result {
                        Ok(entries) => warmed += entries.len(),
                        Err(e) => {
                            failures += 1;
                            tracing::warn!("Background page {} of {} failed: {}", page, catalog_url, e);
                        }
                    }
                }
            }

            tracing::info!(
                "Background continuation for {} done: {} entries warmed, {} pages failed",
                catalog_url,
                warmed,
                failures
            );
        });
    }
}

/// Turns a panicked or cancelled page task into a page failure
fn flatten_join(joined: Result<PageResult, JoinError>) -> PageResult {
    joined.unwrap_or_else(|e| Err(FeedError::Task(e.to_string())))
}
