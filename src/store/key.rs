use crate::classifier::TARGET_EXTENSION;
use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};
use url::Url;

/// Longest filename stem kept from the URL
const MAX_STEM_CHARS: usize = 100;

/// Builds the store key of an artifact: `group/category/filename`
///
/// The group and category segments are omitted when `organize_by_group` is off
/// (or when there is no category). The filename is stable for a given URL, so
/// repeat runs write to the same key.
///
/// # Example
///
/// ```
/// use pdf_trawl::store::artifact_key;
/// use url::Url;
///
/// let url = Url::parse("https://example.gov/docs/Annual%20Report%202023.pdf").unwrap();
/// let key = artifact_key("finance", Some("reports"), &url, true);
/// assert!(key.starts_with("finance/reports/Annual-Report-2023-"));
/// assert!(key.ends_with(".pdf"));
/// ```
pub fn artifact_key(group: &str, category: Option<&str>, url: &Url, organize_by_group: bool) -> String {
    let filename = artifact_filename(url);
    if !organize_by_group {
        return filename;
    }

    let mut segments = vec![sanitize_component(group)];
    if let Some(category) = category.map(sanitize_component).filter(|c| !c.is_empty()) {
        segments.push(category);
    }
    segments.retain(|s| !s.is_empty());
    segments.push(filename);
    segments.join("/")
}

/// Derives a filename from the last path segment plus a short hash of the URL
pub fn artifact_filename(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    let decoded = percent_decode(last);
    let stem = match decoded.to_ascii_lowercase().rfind(TARGET_EXTENSION) {
        Some(idx) if idx + TARGET_EXTENSION.len() == decoded.len() => &decoded[..idx],
        _ => decoded.as_str(),
    };

    let mut stem: String = sanitize_component(stem).chars().take(MAX_STEM_CHARS).collect();
    if stem.is_empty() {
        stem = "document".to_string();
    }

    let digest = Sha256::digest(url.as_str().as_bytes());
    let short = hex::encode(&digest[..4]);

    format!("{}-{}{}", stem, short, TARGET_EXTENSION)
}

/// Keeps word characters, turns whitespace and dash runs into single dashes
fn sanitize_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_dash = false;

    for c in value.chars() {
        if c.is_alphanumeric() || c == '_' {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
    }

    out
}

fn percent_decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}
