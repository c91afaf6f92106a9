use crate::config::GroupConfig;
use crate::url::{extract_host, matches_any, normalize_url};
use crate::UrlError;
use std::time::Duration;
use url::Url;

/// A named set of starting URLs sharing discovery budgets
///
/// Built from a `[[group]]` table and immutable for the rest of the run.
#[derive(Debug, Clone)]
pub struct SeedGroup {
    pub id: String,

    /// Normalized seed URLs, in configured order
    pub seeds: Vec<Url>,

    pub max_depth: u32,
    pub max_pages: usize,
    pub time_limit: Duration,

    /// Keyword filter applied to candidates; empty keeps everything
    pub document_types: Vec<String>,

    pub category: Option<String>,

    /// Host patterns the walk may enter
    pub allowed_domains: Vec<String>,

    pub render_patterns: Vec<String>,
    pub render_all: bool,

    /// Enqueue same-site pages listed in the seed hosts' sitemaps
    pub use_sitemaps: bool,
}

impl SeedGroup {
    /// Builds a seed group from its configuration
    ///
    /// When no allowed domains are configured the walk is restricted to the
    /// hosts of the seeds.
    pub fn from_config(config: &GroupConfig) -> Result<Self, UrlError> {
        let seeds = config
            .seeds
            .iter()
            .map(|s| normalize_url(s))
            .collect::<Result<Vec<_>, _>>()?;

        let allowed_domains = if config.allowed_domains.is_empty() {
            let mut hosts: Vec<String> = seeds.iter().filter_map(extract_host).collect();
            hosts.sort();
            hosts.dedup();
            hosts
        } else {
            config
                .allowed_domains
                .iter()
                .map(|d| d.to_lowercase())
                .collect()
        };

        Ok(Self {
            id: config.id.clone(),
            seeds,
            max_depth: config.max_depth,
            max_pages: config.max_pages,
            time_limit: Duration::from_secs(config.time_limit_secs),
            document_types: config.document_types.clone(),
            category: config.category.clone(),
            allowed_domains,
            render_patterns: config.render_patterns.clone(),
            render_all: config.render_all,
            use_sitemaps: config.use_sitemaps,
        })
    }

    /// Builds a group with default budgets, for programmatic use
    pub fn new(id: impl Into<String>, seeds: &[&str]) -> Result<Self, UrlError> {
        Self::from_config(&GroupConfig {
            id: id.into(),
            seeds: seeds.iter().map(|s| s.to_string()).collect(),
            max_depth: 3,
            max_pages: 1000,
            time_limit_secs: 1800,
            document_types: Vec::new(),
            category: None,
            allowed_domains: Vec::new(),
            render_patterns: Vec::new(),
            render_all: false,
            use_sitemaps: true,
        })
    }

    /// Returns true when the walk may enter pages on this URL's host
    pub fn allows(&self, url: &Url) -> bool {
        extract_host(url)
            .map(|host| matches_any(&self.allowed_domains, &host))
            .unwrap_or(false)
    }

    /// Returns true when the page is flagged as requiring script execution
    pub fn flags_render(&self, url: &Url) -> bool {
        self.render_all || self.render_patterns.iter().any(|p| url.as_str().contains(p.as_str()))
    }
}
