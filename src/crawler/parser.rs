//! HTML extraction for catalog pages
//!
//! This module turns raw markup into catalog data:
//! - Catalog metadata from the first listing page
//! - Entry stubs from listing pages
//! - Full entries from detail pages
//! - Catalog URLs from search result pages
//!
//! The crawler only depends on the [`MarkupExtractor`] trait; [`IvooxExtractor`]
//! is the implementation for iVoox program pages.

use crate::catalog::{CatalogEntry, CatalogInfo, EntryStub};
use crate::url::{entry_id_from_url, normalize_url};
use crate::ParseError;
use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Embedded player URL; `{id}` is replaced with the entry id
const MEDIA_URL_TEMPLATE: &str =
    "https://www.ivoox.com/listenembeded_mn_{id}_1.mp3?source=EMBEDEDHTML5";

/// Translates markup into catalog data
pub trait MarkupExtractor: Send + Sync {
    /// Reads catalog metadata from a listing page
    fn extract_catalog_info(&self, markup: &str) -> Result<CatalogInfo, ParseError>;

    /// Reads the entry stubs listed on a page
    ///
    /// `page_url` is used to resolve relative links. A page without entries is
    /// not an error: it is how a listing past the end of the catalog looks.
    fn extract_stubs(&self, markup: &str, page_url: &Url) -> Result<Vec<EntryStub>, ParseError>;

    /// Reads a full entry from the detail page of `stub`
    ///
    /// An entry without a publication date gets `DateTime::<Utc>::MIN_UTC`,
    /// so it lands at the bottom of an assembled catalog.
    fn extract_entry(&self, stub: &EntryStub, markup: &str) -> Result<CatalogEntry, ParseError>;

    /// Reads the first catalog URL from a search result page
    fn extract_search_result(&self, markup: &str, page_url: &Url) -> Option<Url>;
}

/// [`MarkupExtractor`] for iVoox program and episode pages
#[derive(Debug, Clone, Default)]
pub struct IvooxExtractor;

impl IvooxExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl MarkupExtractor for IvooxExtractor {
    fn extract_catalog_info(&self, markup: &str) -> Result<CatalogInfo, ParseError> {
        let document = parse_document(markup)?;

        let title = select_text(&document, "h1").ok_or(ParseError::MissingField("title"))?;

        let total_entries = select_first(&document, "[itemprop='numberOfEpisodes']").and_then(
            |element| {
                element
                    .value()
                    .attr("content")
                    .map(str::to_string)
                    .unwrap_or_else(|| element_text(&element))
                    .trim()
                    .parse::<usize>()
                    .ok()
            },
        );

        Ok(CatalogInfo {
            title,
            author: select_text(&document, ".info a").unwrap_or_default(),
            description: select_text(&document, ".overview").unwrap_or_default(),
            image_url: select_attr(&document, ".imagen-ficha img", "data-src"),
            total_entries,
        })
    }

    fn extract_stubs(&self, markup: &str, page_url: &Url) -> Result<Vec<EntryStub>, ParseError> {
        let document = parse_document(markup)?;
        let selector = selector(".title-wrapper a[href]");

        let mut stubs = Vec::new();
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };

            let url = match page_url
                .join(href.trim())
                .ok()
                .and_then(|joined| normalize_url(joined.as_str()).ok())
            {
                Some(url) => url,
                None => {
                    tracing::debug!("Skipping unresolvable entry link {:?} on {}", href, page_url);
                    continue;
                }
            };

            stubs.push(EntryStub {
                id: entry_id_from_url(&url),
                title: element_text(&element),
                url,
            });
        }

        Ok(stubs)
    }

    fn extract_entry(&self, stub: &EntryStub, markup: &str) -> Result<CatalogEntry, ParseError> {
        let document = parse_document(markup)?;

        let description = select_text(&document, ".description");
        let date = select_text(&document, ".icon-date");
        if description.is_none() && date.is_none() {
            return Err(ParseError::MissingField("description"));
        }

        if stub.id.is_empty() || !stub.id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ParseError::NoIdentifier(stub.url.to_string()));
        }

        // Undated entries sort after every dated one.
        let published_at = match date {
            Some(text) => parse_listing_date(&text)?,
            None => DateTime::<Utc>::MIN_UTC,
        };

        let title = if stub.title.is_empty() {
            select_text(&document, "h1").unwrap_or_default()
        } else {
            stub.title.clone()
        };

        Ok(CatalogEntry {
            id: stub.id.clone(),
            title,
            media_url: MEDIA_URL_TEMPLATE.replace("{id}", &stub.id),
            description: description.unwrap_or_default(),
            published_at,
            image_url: select_attr(&document, "meta[property='og:image']", "content"),
            duration: select_text(&document, ".icon-time"),
        })
    }

    fn extract_search_result(&self, markup: &str, page_url: &Url) -> Option<Url> {
        let document = Html::parse_document(markup);
        let href = select_attr(&document, ".modulo-type-programa .header-modulo a", "href")?;
        page_url
            .join(&href)
            .ok()
            .and_then(|joined| normalize_url(joined.as_str()).ok())
    }
}

/// Parses a `dd/mm/yyyy` or `dd-mm-yyyy` date as midnight UTC
pub fn parse_listing_date(text: &str) -> Result<DateTime<Utc>, ParseError> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(text, "%d-%m-%Y"))
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc())
        .ok_or_else(|| ParseError::InvalidDate(text.to_string()))
}

fn parse_document(markup: &str) -> Result<Html, ParseError> {
    if markup.trim().is_empty() {
        return Err(ParseError::EmptyDocument);
    }
    Ok(Html::parse_document(markup))
}

/// Compiles a selector known to be valid at build time
fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|_| unreachable!("invalid built-in selector {}", css))
}

fn select_first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    document.select(&selector(css)).next()
}

/// Trimmed text of the first element matching `css`, if non-empty
fn select_text(document: &Html, css: &str) -> Option<String> {
    select_first(document, css)
        .map(|element| element_text(&element))
        .filter(|text| !text.is_empty())
}

fn select_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    select_first(document, css)
        .and_then(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
