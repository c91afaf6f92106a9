use crate::config::types::{Config, CrawlerConfig, GroupConfig, RetryConfig, UserAgentConfig};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Upper bound for the download worker pool
const MAX_CONCURRENT_DOWNLOADS: usize = 64;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_user_agent_config(&config.user_agent)?;

    if config.cache.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.storage.local_path.is_empty() {
        return Err(ConfigError::Validation(
            "local_path cannot be empty".to_string(),
        ));
    }

    validate_groups(&config.groups)
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_downloads < 1 || config.max_concurrent_downloads > MAX_CONCURRENT_DOWNLOADS
    {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_downloads must be between 1 and {}, got {}",
            MAX_CONCURRENT_DOWNLOADS, config.max_concurrent_downloads
        )));
    }

    if config.max_parallel_groups < 1 {
        return Err(ConfigError::Validation(format!(
            "max_parallel_groups must be >= 1, got {}",
            config.max_parallel_groups
        )));
    }

    if config.request_timeout_secs == 0 || config.probe_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request and probe timeouts must be >= 1s".to_string(),
        ));
    }

    if config.max_artifact_bytes == 0 {
        return Err(ConfigError::Validation(
            "max_artifact_bytes must be > 0".to_string(),
        ));
    }

    if config.min_artifact_bytes > config.max_artifact_bytes {
        return Err(ConfigError::Validation(format!(
            "min_artifact_bytes ({}) must not exceed max_artifact_bytes ({})",
            config.min_artifact_bytes, config.max_artifact_bytes
        )));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.max_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max_delay_ms ({}) must be >= base_delay_ms ({})",
            config.max_delay_ms, config.base_delay_ms
        )));
    }

    if config.rate_limit_multiplier < 1 {
        return Err(ConfigError::Validation(
            "rate_limit_multiplier must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_version cannot be empty".to_string(),
        ));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

fn validate_groups(groups: &[GroupConfig]) -> Result<(), ConfigError> {
    if groups.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[group]] must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for group in groups {
        if group.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "group id cannot be empty".to_string(),
            ));
        }

        if !seen.insert(group.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate group id '{}'",
                group.id
            )));
        }

        if group.seeds.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Group '{}' must have at least one seed URL",
                group.id
            )));
        }

        for seed in &group.seeds {
            let url = Url::parse(seed).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e))
            })?;

            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::Validation(format!(
                    "Seed URL '{}' must use HTTP or HTTPS",
                    seed
                )));
            }
        }

        if group.max_pages == 0 {
            return Err(ConfigError::Validation(format!(
                "Group '{}' max_pages must be >= 1",
                group.id
            )));
        }

        for pattern in &group.allowed_domains {
            validate_domain_pattern(pattern)?;
        }
    }

    Ok(())
}

/// Validates a domain pattern (supports a leading `*.` wildcard)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);

    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}
