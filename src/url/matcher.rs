/// Checks if a host matches an allowed-domain pattern
///
/// Two kinds of pattern are supported:
/// 1. Exact: `"example.com"` matches only `example.com`
/// 2. Wildcard: `"*.example.com"` matches `example.com` and any subdomain of it
///
/// Hosts are expected to be lowercased already (see [`crate::url::extract_host`]).
///
/// # Examples
///
/// ```
/// use pdf_trawl::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.gov.example", "gov.example"));
/// assert!(matches_wildcard("*.gov.example", "health.gov.example"));
/// assert!(!matches_wildcard("gov.example", "health.gov.example"));
/// ```
pub fn matches_wildcard(pattern: &str, host: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            host == base
                || (host.len() > base.len()
                    && host.ends_with(base)
                    && host.as_bytes()[host.len() - base.len() - 1] == b'.')
        }
        None => host == pattern,
    }
}

/// Returns true when the host matches at least one of the patterns
pub fn matches_any<S: AsRef<str>>(patterns: &[S], host: &str) -> bool {
    patterns.iter().any(|p| matches_wildcard(p.as_ref(), host))
}
