//! Sitemap parsing
//!
//! Reads the `<loc>` entries of a sitemap or a sitemap index. The document is
//! parsed leniently with the HTML parser, so malformed XML still yields
//! whatever entries can be recognized.

use super::extract::{resolve_link, DiscoveredLink};
use scraper::{Html, Selector};
use url::Url;

/// Entries of one sitemap document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SitemapEntries {
    /// `<url><loc>` entries, as links with no text
    pub pages: Vec<DiscoveredLink>,

    /// `<sitemap><loc>` entries of a sitemap index
    pub nested: Vec<Url>,
}

/// Extracts page and nested sitemap locations, resolved against `base_url`
pub fn extract_sitemap(xml: &str, base_url: &Url) -> SitemapEntries {
    let document = Html::parse_document(xml);
    let mut entries = SitemapEntries::default();

    for loc in locations(&document, "url > loc", base_url) {
        entries.pages.push(DiscoveredLink::anchor(loc, ""));
    }
    for loc in locations(&document, "sitemap > loc", base_url) {
        if let Ok(url) = Url::parse(&loc) {
            entries.nested.push(url);
        }
    }

    entries
}

fn locations(document: &Html, selector: &str, base_url: &Url) -> Vec<String> {
    let Ok(selector) = Selector::parse(selector) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| {
            let text = element.text().collect::<String>();
            resolve_link(text.trim(), base_url)
        })
        .collect()
}
