use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for pdf-trawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,

    /// Seed groups, one `[[group]]` table each
    #[serde(default, rename = "group")]
    pub groups: Vec<GroupConfig>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,

    /// Size of the download worker pool
    #[serde(rename = "max-concurrent-downloads")]
    pub max_concurrent_downloads: usize,

    /// Number of seed groups walked at the same time
    #[serde(rename = "max-parallel-groups")]
    pub max_parallel_groups: usize,

    /// Timeout for page fetches and downloads (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Timeout for existence probes (seconds)
    #[serde(rename = "probe-timeout-secs")]
    pub probe_timeout_secs: u64,

    #[serde(rename = "respect-robots-txt")]
    pub respect_robots_txt: bool,

    /// Allow pages to be handed to a render capability when one is available
    #[serde(rename = "enable-rendering")]
    pub enable_rendering: bool,

    /// Artifacts above this size are rejected
    #[serde(rename = "max-artifact-bytes")]
    pub max_artifact_bytes: u64,

    /// Bodies shorter than this are treated as truncated stubs
    #[serde(rename = "min-artifact-bytes")]
    pub min_artifact_bytes: u64,

    /// Optional deadline for the whole run (seconds)
    #[serde(rename = "run-deadline-secs")]
    pub run_deadline_secs: Option<u64>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 1000,
            max_concurrent_downloads: 5,
            max_parallel_groups: 3,
            request_timeout_secs: 30,
            probe_timeout_secs: 10,
            respect_robots_txt: true,
            enable_rendering: false,
            max_artifact_bytes: 50 * 1024 * 1024,
            min_artifact_bytes: 100,
            run_deadline_secs: None,
        }
    }
}

impl CrawlerConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_secs.map(Duration::from_secs)
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per task, including the first one
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,

    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier applied on HTTP 429
    #[serde(rename = "rate-limit-multiplier")]
    pub rate_limit_multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 32_000,
            rate_limit_multiplier: 4,
        }
    }
}

/// Incremental cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Entries checked within this window are fresh
    #[serde(rename = "freshness-hours")]
    pub freshness_hours: u64,

    /// Entries older than this are pruned
    #[serde(rename = "retention-days")]
    pub retention_days: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            database_path: "./pdf-trawl.db".to_string(),
            freshness_hours: 24,
            retention_days: 30,
        }
    }
}

impl CacheConfig {
    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_hours * 3600)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 24 * 3600)
    }
}

/// Artifact storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for downloaded artifacts
    #[serde(rename = "local-path")]
    pub local_path: String,

    /// Prefix artifact keys with the group id and category
    #[serde(rename = "organize-by-group")]
    pub organize_by_group: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_path: "./downloads".to_string(),
            organize_by_group: true,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value: `Name/Version (+contact-url)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}

/// One seed group
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    pub id: String,

    pub seeds: Vec<String>,

    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: usize,

    #[serde(rename = "time-limit-secs", default = "default_time_limit_secs")]
    pub time_limit_secs: u64,

    /// Keywords a candidate's URL or link text must contain
    #[serde(rename = "document-types", default)]
    pub document_types: Vec<String>,

    /// Storage key segment between the group id and the filename
    #[serde(default)]
    pub category: Option<String>,

    /// Host patterns the walk may enter; defaults to the seed hosts
    #[serde(rename = "allowed-domains", default)]
    pub allowed_domains: Vec<String>,

    /// URL substrings of pages that need script execution
    #[serde(rename = "render-patterns", default)]
    pub render_patterns: Vec<String>,

    #[serde(rename = "render-all", default)]
    pub render_all: bool,

    /// Seed the walk from each seed host's `/sitemap.xml`
    #[serde(rename = "use-sitemaps", default = "default_use_sitemaps")]
    pub use_sitemaps: bool,
}

fn default_max_depth() -> u32 {
    3
}

fn default_max_pages() -> usize {
    1000
}

fn default_time_limit_secs() -> u64 {
    1800
}

fn default_use_sitemaps() -> bool {
    true
}
