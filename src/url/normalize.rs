use crate::UrlError;
use url::form_urlencoded;
use url::Url;

/// Query parameters that only carry tracking information and never change the resource
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "ref", "source"];

/// Normalizes a URL into the form used for every duplicate comparison and cache key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject non-HTTP(S) schemes and host-less URLs
/// 2. Lowercase the scheme and host (the `url` crate already lowercases both)
/// 3. Drop default ports (`:80` for http, `:443` for https)
/// 4. Remove dot segments and empty segments from the path
/// 5. Remove the trailing slash (except for the root `/`)
/// 6. Remove the fragment
/// 7. Drop tracking query parameters and sort the remaining ones by key
///
/// Two URLs that normalize to the same string are the same resource for the
/// discovery walk, the candidate set and the incremental cache.
///
/// # Examples
///
/// ```
/// use pdf_trawl::url::normalize_url;
///
/// let url = normalize_url("HTTP://Example.COM:80/docs/./a.pdf#page=2").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/docs/a.pdf");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .map(|h| h.to_lowercase())
        .ok_or(UrlError::MissingHost)?;
    if host.is_empty() {
        return Err(UrlError::MissingHost);
    }
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    // Default ports are already dropped by Url::parse (port() is None for them)

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter())
                .finish();
            url.set_query(Some(&query));
        }
    }

    Ok(url)
}

/// Normalizes a URL and returns it as the string key used by the cache
pub fn cache_key(url_str: &str) -> Result<String, UrlError> {
    normalize_url(url_str).map(String::from)
}

/// Removes dot segments, repeated slashes and the trailing slash from a path
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    // Stable sort keeps repeated keys in their original relative order
    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
