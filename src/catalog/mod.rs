//! Catalog data model
//!
//! A catalog is the paginated list of items one source publishes (for example
//! one creator's episode index). Listing pages yield [`EntryStub`]s, which are
//! resolved into full [`CatalogEntry`] records from their detail pages.

mod assembler;

pub use assembler::assemble;

use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

/// One resolved catalog item
///
/// Entries are immutable once published, so the `id` doubles as the cache key
/// and the deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    /// Stable identifier derived from the item's canonical URL
    pub id: String,

    pub title: String,

    /// Direct URL of the media file
    pub media_url: String,

    pub description: String,

    pub published_at: DateTime<Utc>,

    pub image_url: Option<String>,

    /// Display duration, as shown by the source (e.g. "01:02:03")
    pub duration: Option<String>,
}

/// A reference to an entry found on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStub {
    /// Stable identifier, see [`crate::url::entry_id_from_url`]
    pub id: String,

    /// Absolute URL of the entry's detail page
    pub url: Url,

    /// Title as displayed on the listing
    pub title: String,
}

/// Catalog-level metadata read from the first listing page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogInfo {
    pub title: String,
    pub author: String,
    pub description: String,
    pub image_url: Option<String>,

    /// Entry count advertised by the source, when it shows one
    pub total_entries: Option<usize>,
}
