use crate::UrlError;
use url::Url;

/// List of tracking query parameters to remove during canonicalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
    "ref",
    "source",
];

/// Canonicalizes a URL into the unique form used for deduplication
///
/// # Canonicalization Steps
///
/// 1. Parse the URL; reject if malformed or non-HTTP(S)
/// 2. Lowercase the scheme and host (the `url` crate does this on parse)
/// 3. Remove the `www.` prefix from the host
/// 4. Collapse repeated slashes and dot segments in the path
/// 5. Remove the trailing slash, except for the root path
/// 6. Remove the fragment
/// 7. Remove tracking query parameters; sort the rest alphabetically
/// 8. Remove an empty query string entirely
///
/// Any two URL strings denoting the same resource under these rules produce
/// byte-identical output, so the canonical string can be used directly as a
/// dedup key.
///
/// # Arguments
///
/// * `url_str` - The URL string to canonicalize
///
/// # Returns
///
/// * `Ok(Url)` - Canonical URL
/// * `Err(UrlError)` - Failed to parse or canonicalize the URL
///
/// # Examples
///
/// ```
/// use trawler::canonicalize_url;
///
/// let url = canonicalize_url("HTTPS://WWW.Example.COM//page/?utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/page");
/// ```
pub fn canonicalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    // Host: already lowercased by the parser; strip the www. prefix
    let host = url.host_str().ok_or(UrlError::MissingHost)?;
    if let Some(bare) = host.strip_prefix("www.") {
        let bare = bare.to_string();
        url.set_host(Some(bare.as_str()))
            .map_err(|e| UrlError::Parse(format!("failed to set host: {}", e)))?;
    }

    // Path: collapse repeated slashes and dot segments, trim trailing slash
    let canonical_path = canonical_path(url.path());
    url.set_path(&canonical_path);

    // Fragment never participates in identity
    url.set_fragment(None);

    // Query: drop tracking parameters, sort the remainder
    if url.query().is_some() {
        let params = filter_and_sort_query(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            let joined = params
                .iter()
                .map(|(k, v)| {
                    if v.is_empty() {
                        k.clone()
                    } else {
                        format!("{}={}", k, v)
                    }
                })
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&joined));
        }
    }

    Ok(url)
}

/// Collapses repeated slashes and dot segments, trimming the trailing slash
/// except at the root.
fn canonical_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            // Empty segments come from repeated slashes
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_scheme_and_host() {
        let result = canonicalize_url("HTTP://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "http://example.com/Page");
    }

    #[test]
    fn test_remove_www() {
        let result = canonicalize_url("https://www.example.com/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_remove_trailing_slash() {
        let result = canonicalize_url("https://example.com/page/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_keep_root_slash() {
        let result = canonicalize_url("https://example.com/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_empty_path_becomes_root() {
        let result = canonicalize_url("https://example.com").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_remove_fragment() {
        let result = canonicalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_collapse_repeated_slashes() {
        let result = canonicalize_url("https://example.com///a//b///c").unwrap();
        assert_eq!(result.as_str(), "https://example.com/a/b/c");
    }

    #[test]
    fn test_dot_segments() {
        let result = canonicalize_url("https://example.com/a/../b/./c").unwrap();
        assert_eq!(result.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn test_parent_directory_at_root() {
        let result = canonicalize_url("https://example.com/../page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_remove_tracking_params() {
        let result = canonicalize_url("https://example.com/page?utm_source=twitter").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_sort_query_params() {
        let result = canonicalize_url("https://example.com/page?b=2&a=1").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page?a=1&b=2");
    }

    #[test]
    fn test_mixed_query_params() {
        let result = canonicalize_url(
            "https://example.com/page?keep=yes&utm_medium=email&another=value&fbclid=123",
        )
        .unwrap();
        assert_eq!(
            result.as_str(),
            "https://example.com/page?another=value&keep=yes"
        );
    }

    #[test]
    fn test_custom_utm_param() {
        let result = canonicalize_url("https://example.com/page?utm_custom=value").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_http_preserved() {
        // HTTP is a valid scheme of its own; the HTTPS->HTTP fallback relies on it
        let result = canonicalize_url("http://example.com/page").unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = canonicalize_url("ftp://example.com/file");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        assert!(canonicalize_url("not a url").is_err());
    }

    #[test]
    fn test_same_resource_same_key() {
        let a = canonicalize_url("https://WWW.example.com//x/?utm_source=a#f").unwrap();
        let b = canonicalize_url("https://example.com/x").unwrap();
        assert_eq!(a.as_str(), b.as_str());
    }
}
