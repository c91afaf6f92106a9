//! Integration tests for pdf-trawl
//!
//! These tests use wiremock to create mock HTTP servers and exercise
//! discovery, downloads and whole runs end-to-end.

mod discovery_tests;
mod harvest_tests;

use pdf_trawl::cache::{IncrementalCache, SqliteCache};
use pdf_trawl::config::{parse_config, Config, UserAgentConfig};
use pdf_trawl::crawler::HttpFetcher;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use wiremock::ResponseTemplate;

/// Body of a minimal valid PDF
pub const PDF_BODY: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n%%EOF\n";

pub fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestTrawler".to_string(),
        crawler_version: "1.0".to_string(),
        contact_url: "https://example.com/about".to_string(),
    }
}

pub fn http_fetcher() -> Arc<HttpFetcher> {
    Arc::new(HttpFetcher::new(&user_agent()).expect("Failed to build HTTP client"))
}

pub fn memory_cache() -> IncrementalCache {
    let sqlite = SqliteCache::new_in_memory().expect("Failed to open in-memory cache");
    IncrementalCache::new(
        Arc::new(sqlite),
        Duration::from_secs(24 * 3600),
        Duration::from_secs(30 * 24 * 3600),
    )
}

/// An HTML page with one anchor per `(href, text)` pair
pub fn html_page(links: &[(&str, &str)]) -> ResponseTemplate {
    let anchors: String = links
        .iter()
        .map(|(href, text)| format!("<a href=\"{}\">{}</a>\n", href, text))
        .collect();
    let body = format!("<html><body>\n{}</body></html>", anchors);
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/html")
}

pub fn pdf_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(PDF_BODY.to_vec(), "application/pdf")
}

pub fn pdf_head() -> ResponseTemplate {
    ResponseTemplate::new(200).insert_header("content-type", "application/pdf")
}

/// Builds a validated config whose cache and artifacts live under `dir`
///
/// `crawler` and `retry` are extra keys for those tables; `groups` is one or
/// more `[[group]]` tables.
pub fn test_config(dir: &Path, crawler: &str, retry: &str, groups: &str) -> Config {
    let toml = format!(
        r#"
[crawler]
respect-robots-txt = false
request-timeout-secs = 5
probe-timeout-secs = 5
{crawler}

[retry]
{retry}

[cache]
database-path = "{db}"

[storage]
local-path = "{downloads}"

[user-agent]
crawler-name = "TestTrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"

{groups}
"#,
        crawler = crawler,
        retry = retry,
        db = dir.join("trawl.db").display(),
        downloads = dir.join("downloads").display(),
        groups = groups,
    );
    parse_config(&toml).expect("Failed to parse test config")
}
