//! URL handling module for dirtyrss
//!
//! This module derives listing page URLs from a catalog URL, stable entry
//! identifiers from detail URLs, and normalizes URLs found in markup.

mod normalize;
mod page;

pub use normalize::normalize_url;
pub use page::{entry_id_from_url, page_url};
