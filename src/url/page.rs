use crate::url::normalize_url;
use crate::UrlError;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Placeholder substituted with the page number in catalog URL templates
const PAGE_PLACEHOLDER: &str = "{page}";

fn numbered_page_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Listing pages that end in `_<n>.html`, e.g. `podcast-foo_sq_f1123_1.html`
    PATTERN.get_or_init(|| Regex::new(r"_(\d+)\.html$").expect("valid page regex"))
}

fn entry_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d{6,12}").expect("valid id regex"))
}

/// Derives the URL of listing page `page` (1-based) of a catalog
///
/// Three URL shapes are understood, tried in order:
///
/// 1. A template containing `{page}`, which is substituted
/// 2. A path ending in `_<n>.html`, whose number is replaced
/// 3. Anything else, which gets a `page=<n>` query parameter
///
/// # Examples
///
/// ```
/// use dirtyrss::url::page_url;
///
/// let url = page_url("https://www.ivoox.com/podcast-demo_sq_f1123_1.html", 3).unwrap();
/// assert_eq!(url.as_str(), "https://www.ivoox.com/podcast-demo_sq_f1123_3.html");
/// ```
pub fn page_url(catalog_url: &str, page: u32) -> Result<Url, UrlError> {
    if catalog_url.contains(PAGE_PLACEHOLDER) {
        return normalize_url(&catalog_url.replace(PAGE_PLACEHOLDER, &page.to_string()));
    }

    let mut url = normalize_url(catalog_url)?;

    let path = url.path().to_string();
    if numbered_page_pattern().is_match(&path) {
        let replaced = numbered_page_pattern().replace(&path, format!("_{}.html", page));
        url.set_path(&replaced);
        return Ok(url);
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("page", &page.to_string());

    Ok(url)
}

/// Derives the stable identifier of an entry from its canonical URL
///
/// The identifier is the last run of 6 to 12 digits in the URL path, which is
/// where item ids live in catalog URLs. URLs without one are identified by
/// their full normalized form.
pub fn entry_id_from_url(url: &Url) -> String {
    entry_id_pattern()
        .find_iter(url.path())
        .last()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| {
            let mut canonical = url.clone();
            canonical.set_fragment(None);
            canonical.to_string()
        })
}
