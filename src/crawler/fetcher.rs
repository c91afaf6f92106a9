//! HTTP fetcher implementation
//!
//! This module handles all plain HTTP requests made by the crawler:
//! - Building the HTTP client with the polite user agent string
//! - GET requests for pages during discovery
//! - HEAD probes for candidate content types
//! - Size-bounded GET requests for artifacts
//!
//! Non-2xx responses come back as [`FetchError::Status`] so the retry policy can
//! classify them. Rate limiting and retries are the caller's concern.

use crate::config::UserAgentConfig;
use crate::crawler::FetchError;
use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED, RETRY_AFTER,
};
use reqwest::{redirect::Policy, Client, Response};
use std::time::Duration;
use url::Url;

/// Maximum redirect hops followed by the client
const MAX_REDIRECTS: usize = 10;

/// A fetched page
#[derive(Debug, Clone)]
pub struct PageResponse {
    /// Final URL after redirects
    pub url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    /// Body text; empty for non-text responses
    pub body: String,
}

impl PageResponse {
    /// True when the response can be scanned for links
    pub fn is_html(&self) -> bool {
        match &self.content_type {
            None => true,
            Some(ct) => {
                let ct = ct.to_ascii_lowercase();
                ct.contains("html") || ct.contains("xml")
            }
        }
    }

    /// True when the body was read as text
    pub fn is_text(&self) -> bool {
        self.is_html()
            || self
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("text/"))
    }
}

/// Headers returned by an existence probe
#[derive(Debug, Clone, Default)]
pub struct ProbeResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub content_length: Option<u64>,
    /// ETag, or Last-Modified when no ETag is sent
    pub validator: Option<String>,
}

/// A downloaded artifact
#[derive(Debug, Clone)]
pub struct DownloadResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub validator: Option<String>,
    pub body: Vec<u8>,
}

/// Plain HTTP capability used by discovery and downloads
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches a page, reading at most `max_bytes` of a text body
    async fn fetch_page(
        &self,
        url: &Url,
        timeout: Duration,
        max_bytes: u64,
    ) -> Result<PageResponse, FetchError>;

    /// Lightweight existence probe (HEAD)
    async fn probe(&self, url: &Url, timeout: Duration) -> Result<ProbeResponse, FetchError>;

    /// Downloads a resource, failing once the body exceeds `max_bytes`
    async fn download(
        &self,
        url: &Url,
        timeout: Duration,
        max_bytes: u64,
    ) -> Result<DownloadResponse, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use pdf_trawl::config::UserAgentConfig;
/// use pdf_trawl::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "PdfTrawl".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`PageFetcher`] backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(
        &self,
        url: &Url,
        timeout: Duration,
        max_bytes: u64,
    ) -> Result<PageResponse, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url.as_str(), e))?;
        let response = check_status(url, response)?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let content_type = header_string(response.headers(), CONTENT_TYPE.as_str());

        let page = PageResponse {
            url: final_url,
            status,
            content_type,
            body: String::new(),
        };
        if !page.is_text() {
            return Ok(page);
        }

        let bytes = read_body(url, response, max_bytes, true).await?;
        Ok(PageResponse {
            body: String::from_utf8_lossy(&bytes).into_owned(),
            ..page
        })
    }

    async fn probe(&self, url: &Url, timeout: Duration) -> Result<ProbeResponse, FetchError> {
        let response = self
            .client
            .head(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url.as_str(), e))?;
        let response = check_status(url, response)?;

        let headers = response.headers();
        Ok(ProbeResponse {
            status: response.status().as_u16(),
            content_type: header_string(headers, CONTENT_TYPE.as_str()),
            content_disposition: header_string(headers, CONTENT_DISPOSITION.as_str()),
            content_length: header_string(headers, CONTENT_LENGTH.as_str())
                .and_then(|v| v.parse().ok()),
            validator: validator(headers),
        })
    }

    async fn download(
        &self,
        url: &Url,
        timeout: Duration,
        max_bytes: u64,
    ) -> Result<DownloadResponse, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url.as_str(), e))?;
        let response = check_status(url, response)?;

        if let Some(declared) = response.content_length() {
            if declared > max_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    size: declared,
                    limit: max_bytes,
                });
            }
        }

        let status = response.status().as_u16();
        let headers = response.headers();
        let content_type = header_string(headers, CONTENT_TYPE.as_str());
        let content_disposition = header_string(headers, CONTENT_DISPOSITION.as_str());
        let validator = validator(headers);

        let body = read_body(url, response, max_bytes, false).await?;
        Ok(DownloadResponse {
            status,
            content_type,
            content_disposition,
            validator,
            body,
        })
    }
}

/// Turns non-2xx responses into status errors
fn check_status(url: &Url, response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    Err(FetchError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        retry_after: response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after),
    })
}

/// Reads the body chunk by chunk up to `max_bytes`
///
/// With `truncate` the body is cut at the limit; otherwise exceeding it fails.
async fn read_body(
    url: &Url,
    mut response: Response,
    max_bytes: u64,
    truncate: bool,
) -> Result<Vec<u8>, FetchError> {
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| FetchError::from_reqwest(url.as_str(), e))?
    {
        let total = (body.len() + chunk.len()) as u64;
        if total > max_bytes {
            if truncate {
                let room = (max_bytes as usize).saturating_sub(body.len());
                body.extend_from_slice(&chunk[..room.min(chunk.len())]);
                break;
            }
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                size: total,
                limit: max_bytes,
            });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn validator(headers: &HeaderMap) -> Option<String> {
    header_string(headers, ETAG.as_str())
        .or_else(|| header_string(headers, LAST_MODIFIED.as_str()))
}

/// Parses a `Retry-After` value: delay seconds or an HTTP date
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let wait = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}
