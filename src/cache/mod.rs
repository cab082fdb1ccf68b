//! Process-wide caches shared by every crawl
//!
//! Both caches are plain local lookups: a `get` never touches the network, and
//! an entry read past its expiry behaves as absent.

mod ttl;

pub use ttl::{CacheEntry, TtlCache};

use crate::catalog::CatalogEntry;

/// Resolved entries keyed by entry id
pub type EntryCache = TtlCache<CatalogEntry>;

/// Raw listing markup keyed by absolute page URL
pub type PageCache = TtlCache<String>;
