//! Resolving program names into catalog URLs

use crate::crawler::pages::PageFetcher;
use crate::url::normalize_url;
use crate::FeedError;

/// Site searched when the target is a program name
pub const DEFAULT_SEARCH_BASE: &str = "https://www.ivoox.com";

/// Resolves a target into a catalog URL
///
/// Targets that already are HTTP(S) URLs are returned normalized. Anything
/// else is treated as a program name, lowercased and hyphenated, and looked up
/// on `<search_base>/<name>_sw_1_1.html`.
///
/// # Returns
///
/// * `Ok(Some(String))` - The catalog URL
/// * `Ok(None)` - The search found no catalog
/// * `Err(FeedError)` - The search page could not be fetched
pub async fn resolve_catalog(
    fetcher: &PageFetcher,
    target: &str,
    search_base: &str,
) -> Result<Option<String>, FeedError> {
    if let Ok(url) = normalize_url(target) {
        return Ok(Some(url.to_string()));
    }

    let name = search_slug(target);
    if name.is_empty() {
        return Ok(None);
    }

    let search_url = normalize_url(&format!(
        "{}/{}_sw_1_1.html",
        search_base.trim_end_matches('/'),
        name
    ))?;
    tracing::info!("Searching for the program \"{}\"", target.trim());

    let markup = fetcher.fetch_markup(search_url.as_str()).await?;
    let found = fetcher
        .extractor()
        .extract_search_result(&markup, &search_url);
    match &found {
        Some(url) => tracing::debug!("Program url: {}", url),
        None => tracing::warn!("No program found for \"{}\"", target.trim()),
    }

    Ok(found.map(|url| url.to_string()))
}

/// `"  My Demo   Show "` becomes `"my-demo-show"`
fn search_slug(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}
