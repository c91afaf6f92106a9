//! HTML link extraction
//!
//! Pulls every link-bearing element out of a page together with the text and
//! attributes the classifier scores:
//! - `<a href>` (including links carrying the `download` attribute)
//! - `<iframe src>`, `<embed src>`, `<object data>` (embedded documents and viewers)
//! - any element with a `data-url` attribute
//!
//! `javascript:`, `mailto:`, `tel:`, `data:` and fragment-only links are dropped,
//! everything else is resolved against the page URL.

use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Attributes carried along with a link for keyword scoring
const SCORED_ATTRIBUTES: &[&str] = &["title", "aria-label", "type", "download", "class"];

/// Where on the page a link was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSource {
    Anchor,
    Embed,
    DataAttribute,
}

/// A link discovered on a page, either parsed from HTML or reported by a renderer
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredLink {
    /// Absolute URL the link points at
    pub url: String,

    /// Visible link text with whitespace collapsed
    pub text: String,

    /// Selected attributes of the element (name, value)
    pub attributes: Vec<(String, String)>,

    pub source: LinkSource,
}

impl DiscoveredLink {
    /// Builds an anchor link, the shape renderers report links in
    pub fn anchor(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: text.into(),
            attributes: Vec::new(),
            source: LinkSource::Anchor,
        }
    }
}

/// Everything extracted from one HTML page
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    pub links: Vec<DiscoveredLink>,

    /// The page contains `<script>` or `<noscript>` elements
    pub has_script: bool,
}

/// Parses HTML and extracts its links
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `base_url` - The page URL used to resolve relative links
pub fn extract_links(html: &str, base_url: &Url) -> ExtractedPage {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if let Some(link) = build_link(&element, "href", base_url, LinkSource::Anchor) {
                links.push(link);
            }
        }
    }

    for (selector, attr) in [("iframe[src]", "src"), ("embed[src]", "src"), ("object[data]", "data")] {
        if let Ok(selector) = Selector::parse(selector) {
            for element in document.select(&selector) {
                if let Some(link) = build_link(&element, attr, base_url, LinkSource::Embed) {
                    links.push(link);
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse("[data-url]") {
        for element in document.select(&selector) {
            if let Some(link) =
                build_link(&element, "data-url", base_url, LinkSource::DataAttribute)
            {
                links.push(link);
            }
        }
    }

    let has_script = Selector::parse("script, noscript")
        .map(|s| document.select(&s).next().is_some())
        .unwrap_or(false);

    ExtractedPage { links, has_script }
}

fn build_link(
    element: &ElementRef<'_>,
    attr: &str,
    base_url: &Url,
    source: LinkSource,
) -> Option<DiscoveredLink> {
    let raw = element.value().attr(attr)?;
    let url = resolve_link(raw, base_url)?;

    let text = element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let attributes = SCORED_ATTRIBUTES
        .iter()
        .filter_map(|name| {
            element
                .value()
                .attr(name)
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect();

    Some(DiscoveredLink {
        url,
        text,
        attributes,
        source,
    })
}

/// Resolves a raw link against the base URL
///
/// Returns None for empty, fragment-only and non-HTTP(S) links.
pub fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute.to_string()),
        _ => None,
    }
}
