use url::Url;

/// Extracts the lowercased host name of a URL
///
/// Returns `None` for URLs without a host (which never survive normalization).
///
/// # Examples
///
/// ```
/// use url::Url;
/// use pdf_trawl::url::extract_host;
///
/// let url = Url::parse("https://Docs.Example.com:8443/a.pdf").unwrap();
/// assert_eq!(extract_host(&url), Some("docs.example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the key that identifies a server for politeness purposes
///
/// This is the host name plus the port when the URL names a non-default one, so
/// `example.com` and `example.com:443` share a gate while two services on one
/// machine listening on different ports do not.
pub fn host_key(url: &Url) -> Option<String> {
    let host = extract_host(url)?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Returns true when both URLs are served by the same server
pub fn same_host(a: &Url, b: &Url) -> bool {
    matches!((host_key(a), host_key(b)), (Some(x), Some(y)) if x == y)
}
