//! Integration tests for the crawler
//!
//! These tests use wiremock to serve a fake catalog and run whole crawls
//! through the real HTTP page source.

use chrono::{Duration as DateDelta, NaiveDate};
use dirtyrss::cache::{EntryCache, PageCache};
use dirtyrss::config::{CacheConfig, UserAgentConfig};
use dirtyrss::crawler::{
    resolve_catalog, CatalogCrawler, CrawlSettings, HttpPageSource, IvooxExtractor, PageFetcher,
    RateLimiter,
};
use dirtyrss::FeedError;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FIRST_ID: u32 = 1_000_001;

/// Creates a crawler against the mock server with a generous request budget
fn create_test_crawler(batch_size: usize, timeout: Duration) -> CatalogCrawler {
    let user_agent = UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
    };
    let source = HttpPageSource::from_config(&user_agent).expect("Failed to build page source");

    let fetcher = PageFetcher::new(
        Arc::new(source),
        Arc::new(IvooxExtractor::new()),
        Arc::new(RateLimiter::new(100, 120, Duration::from_secs(5))),
        Arc::new(EntryCache::new()),
        Arc::new(PageCache::new()),
    )
    .with_ttls(&CacheConfig::default());

    CatalogCrawler::new(
        fetcher,
        CrawlSettings {
            batch_size,
            timeout,
            max_pages: 999,
        },
    )
}

fn catalog_url(server: &MockServer) -> String {
    format!("{}/podcast-demo_sq_f1_1.html", server.uri())
}

fn listing_markup(ids: &[u32]) -> String {
    let links: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<div class="title-wrapper"><a href="/ep-{id}_rf_{id}_1.html">Episode {id}</a></div>"#
            )
        })
        .collect();
    format!(
        r#"<html><body><h1>Demo Show</h1><meta itemprop="numberOfEpisodes" content="45">{}</body></html>"#,
        links
    )
}

/// Entry `id` is published `id - FIRST_ID` days after 2023-01-01
fn detail_markup(id: u32) -> String {
    let published = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
        + DateDelta::days(i64::from(id - FIRST_ID));
    format!(
        r#"<html><body><span class="icon-date">{}</span><span class="icon-time">12:00</span><div class="description">Episode {}</div></body></html>"#,
        published.format("%d/%m/%Y"),
        id
    )
}

/// Mounts listing page `n` (1-based) for every slice of ids, plus one empty
/// page after them
async fn mount_listings(server: &MockServer, pages: &[Vec<u32>]) {
    for (index, ids) in pages.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(format!("/podcast-demo_sq_f1_{}.html", index + 1)))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing_markup(ids)))
            .mount(server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path(format!("/podcast-demo_sq_f1_{}.html", pages.len() + 1)))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_markup(&[])))
        .mount(server)
        .await;
}

async fn mount_details(server: &MockServer, ids: impl IntoIterator<Item = u32>) {
    for id in ids {
        Mock::given(method("GET"))
            .and(path(format!("/ep-{id}_rf_{id}_1.html")))
            .respond_with(ResponseTemplate::new(200).set_body_string(detail_markup(id)))
            .mount(server)
            .await;
    }
}

async fn mount_catalog(server: &MockServer, pages: &[Vec<u32>]) {
    mount_listings(server, pages).await;
    let ids: HashSet<u32> = pages.iter().flatten().copied().collect();
    mount_details(server, ids).await;
}

/// 45 entries over pages of 20, 20 and 5
fn forty_five_entries() -> Vec<Vec<u32>> {
    let ids: Vec<u32> = (FIRST_ID..FIRST_ID + 45).collect();
    ids.chunks(20).map(<[u32]>::to_vec).collect()
}

async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or(0)
}

async fn wait_for_background(crawler: &CatalogCrawler) {
    for _ in 0..200 {
        if crawler.background_in_flight() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("background continuation did not finish");
}

#[tokio::test]
async fn test_full_crawl_returns_sorted_unique_entries() {
    let mock_server = MockServer::start().await;
    let mut pages = forty_five_entries();
    // A stale listing repeats an entry from the previous page.
    pages[2].push(FIRST_ID + 25);
    mount_catalog(&mock_server, &pages).await;

    let crawler = create_test_crawler(2, Duration::from_secs(10));
    let outcome = crawler
        .crawl_session(&catalog_url(&mock_server), 45, 20)
        .await
        .expect("Crawl failed");

    assert_eq!(outcome.pages_planned, 4);
    assert_eq!(outcome.pages_completed, 4);
    assert!(!outcome.deadline_exceeded);
    assert!(outcome.handed_off.is_empty());

    assert_eq!(outcome.entries.len(), 45);
    let ids: HashSet<&str> = outcome.entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids.len(), 45, "entries should be unique");

    assert!(outcome
        .entries
        .windows(2)
        .all(|pair| pair[0].published_at >= pair[1].published_at));
    assert_eq!(outcome.entries[0].id, (FIRST_ID + 44).to_string());
    assert_eq!(outcome.entries[44].id, FIRST_ID.to_string());
    assert_eq!(
        outcome.entries[0].media_url,
        format!(
            "https://www.ivoox.com/listenembeded_mn_{}_1.mp3?source=EMBEDEDHTML5",
            FIRST_ID + 44
        )
    );

    // Each detail page is fetched once even though one entry is listed twice.
    assert_eq!(request_count(&mock_server).await, 4 + 45);
}

#[tokio::test]
async fn test_deadline_returns_early_and_background_warms_caches() {
    let mock_server = MockServer::start().await;
    mount_catalog(&mock_server, &forty_five_entries()).await;
    let url = catalog_url(&mock_server);

    let crawler = create_test_crawler(2, Duration::ZERO);
    let outcome = crawler.crawl_session(&url, 45, 20).await.expect("Crawl failed");

    assert!(outcome.deadline_exceeded);
    assert!(outcome.entries.len() < 45);
    assert_eq!(outcome.handed_off, vec![1, 2, 3, 4]);

    wait_for_background(&crawler).await;
    let after_background = request_count(&mock_server).await;
    assert_eq!(after_background, 4 + 45);

    // Same caches, longer deadline: everything is served without the network.
    let warm = CatalogCrawler::new(
        crawler.fetcher().clone(),
        CrawlSettings {
            batch_size: 2,
            timeout: Duration::from_secs(10),
            max_pages: 999,
        },
    );
    let entries = warm.crawl(&url, 45, 20).await.expect("Crawl failed");

    assert_eq!(entries.len(), 45);
    assert_eq!(request_count(&mock_server).await, after_background);
}

#[tokio::test]
async fn test_deadline_after_first_batch_keeps_its_entries() {
    let mock_server = MockServer::start().await;
    let ids: Vec<u32> = (FIRST_ID..FIRST_ID + 9).collect();
    let pages: Vec<Vec<u32>> = ids.chunks(3).map(<[u32]>::to_vec).collect();

    for (index, page_ids) in pages.iter().enumerate() {
        let mut response = ResponseTemplate::new(200).set_body_string(listing_markup(page_ids));
        if index == 2 {
            response = response.set_delay(Duration::from_millis(800));
        }
        Mock::given(method("GET"))
            .and(path(format!("/podcast-demo_sq_f1_{}.html", index + 1)))
            .respond_with(response)
            .mount(&mock_server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/podcast-demo_sq_f1_4.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_markup(&[])))
        .mount(&mock_server)
        .await;
    mount_details(&mock_server, ids.iter().copied()).await;
    let url = catalog_url(&mock_server);

    // 9 entries / 3 per page + 1 = 4 pages; batch [1, 2] is fast, page 3 is not.
    let crawler = create_test_crawler(2, Duration::from_millis(400));
    let outcome = crawler.crawl_session(&url, 9, 3).await.expect("Crawl failed");

    assert!(outcome.deadline_exceeded);
    assert_eq!(outcome.pages_completed, 2);
    assert_eq!(outcome.handed_off, vec![3, 4]);

    let first: HashSet<String> = outcome.entries.iter().map(|e| e.id.clone()).collect();
    let first_batch: HashSet<String> = ids[..6].iter().map(u32::to_string).collect();
    assert_eq!(first, first_batch);

    wait_for_background(&crawler).await;

    let warm = CatalogCrawler::new(
        crawler.fetcher().clone(),
        CrawlSettings {
            batch_size: 2,
            timeout: Duration::from_secs(10),
            max_pages: 999,
        },
    );
    let second: HashSet<String> = warm
        .crawl(&url, 9, 3)
        .await
        .expect("Crawl failed")
        .into_iter()
        .map(|e| e.id)
        .collect();

    assert_eq!(second.len(), 9);
    assert!(second.is_superset(&first));
    assert!(second.len() > first.len());
}

#[tokio::test]
async fn test_broken_entry_is_omitted() {
    let mock_server = MockServer::start().await;
    let broken = FIRST_ID + 2;

    let ids: Vec<u32> = (FIRST_ID..FIRST_ID + 5).collect();
    mount_listings(&mock_server, &[ids.clone()]).await;
    mount_details(&mock_server, ids.into_iter().filter(|&id| id != broken)).await;
    Mock::given(method("GET"))
        .and(path(format!("/ep-{broken}_rf_{broken}_1.html")))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body><p>oops</p></body></html>"),
        )
        .mount(&mock_server)
        .await;

    let crawler = create_test_crawler(2, Duration::from_secs(10));
    let entries = crawler
        .crawl(&catalog_url(&mock_server), 5, 20)
        .await
        .expect("Crawl failed");

    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|e| e.id != broken.to_string()));
}

#[tokio::test]
async fn test_first_batch_failure_is_fatal() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/podcast-demo_sq_f1_1.html"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let crawler = create_test_crawler(2, Duration::from_secs(10));
    let result = crawler.crawl(&catalog_url(&mock_server), 45, 20).await;

    match result {
        Err(FeedError::Fatal { source, .. }) => {
            assert!(matches!(*source, FeedError::Http { status: 500, .. }));
        }
        other => panic!("expected a fatal error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fetch_info_reads_catalog_metadata() {
    let mock_server = MockServer::start().await;
    mount_catalog(&mock_server, &forty_five_entries()).await;

    let crawler = create_test_crawler(2, Duration::from_secs(10));
    let info = crawler
        .fetch_info(&catalog_url(&mock_server))
        .await
        .expect("Failed to fetch info");

    assert_eq!(info.title, "Demo Show");
    assert_eq!(info.total_entries, Some(45));

    // Page 1 is served from the listing cache during the crawl.
    crawler
        .crawl(&catalog_url(&mock_server), 45, 20)
        .await
        .expect("Crawl failed");
    assert_eq!(request_count(&mock_server).await, 4 + 45);
}

#[tokio::test]
async fn test_program_name_is_resolved_by_search() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/demo-show_sw_1_1.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<div class="modulo-type-programa"><div class="header-modulo">
               <a href="/podcast-demo_sq_f1_1.html">Demo Show</a></div></div>"#,
        ))
        .mount(&mock_server)
        .await;

    let crawler = create_test_crawler(2, Duration::from_secs(10));
    let found = resolve_catalog(crawler.fetcher(), "Demo Show", &mock_server.uri())
        .await
        .expect("Search failed");

    assert_eq!(found, Some(catalog_url(&mock_server)));
}
