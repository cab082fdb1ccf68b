use crate::UrlError;
use url::Url;

/// Normalizes a URL so the same item always maps to the same string
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require an HTTP or HTTPS scheme
/// 3. Lowercase the host
/// 4. Remove the fragment
///
/// Query parameters are kept: some catalogs carry the page number there.
///
/// # Examples
///
/// ```
/// use dirtyrss::url::normalize_url;
///
/// let url = normalize_url("https://WWW.IVOOX.COM/episode_rf_123456_1.html#player").unwrap();
/// assert_eq!(url.as_str(), "https://www.ivoox.com/episode_rf_123456_1.html");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    // The url crate already lowercases domain hosts; IP hosts need no change.
    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);

    Ok(url)
}
