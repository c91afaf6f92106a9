//! Robots.txt parser implementation
//!
//! Allow/disallow matching is delegated to the robotstxt crate; `Crawl-delay`
//! is not part of its matcher and is read here.

use robotstxt::DefaultMatcher;
use std::time::Duration;
use url::Url;

/// Longest crawl delay honoured from a robots.txt file
const MAX_CRAWL_DELAY: Duration = Duration::from_secs(60);

/// Parsed robots.txt data for one host
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty means allow all)
    content: String,
}

impl ParsedRobots {
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Permissive rules, used when robots.txt is missing or unreachable
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Checks a URL (or bare path) against the rules for `agent`
    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        if self.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, agent, url)
    }

    pub fn is_url_allowed(&self, url: &Url, agent: &str) -> bool {
        self.is_allowed(url.as_str(), agent)
    }

    /// Crawl delay for `agent`, capped at one minute
    ///
    /// A group naming the agent wins over the `*` group. Consecutive
    /// `User-agent` lines form one group; any other directive closes the list.
    pub fn crawl_delay(&self, agent: &str) -> Option<Duration> {
        if self.is_empty() {
            return None;
        }

        let agent = agent.to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut group_open = false;
        let mut specific = None;
        let mut wildcard = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            if key == "user-agent" {
                if !group_open {
                    group.clear();
                    group_open = true;
                }
                group.push(value.to_lowercase());
                continue;
            }
            group_open = false;

            if key != "crawl-delay" {
                continue;
            }
            let Ok(secs) = value.parse::<f64>() else {
                continue;
            };
            if !secs.is_finite() || secs < 0.0 {
                continue;
            }

            let delay = Duration::from_secs_f64(secs).min(MAX_CRAWL_DELAY);
            if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                specific = Some(delay);
            } else if group.iter().any(|ua| ua == "*") {
                wildcard = Some(delay);
            }
        }

        specific.or(wildcard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed("/reports/annual.pdf", "PdfTrawl"));
        assert_eq!(robots.crawl_delay("PdfTrawl"), None);
    }

    #[test]
    fn test_disallow_prefix() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /private");
        let open = Url::parse("https://example.gov/reports").unwrap();
        let closed = Url::parse("https://example.gov/private/list").unwrap();
        assert!(robots.is_url_allowed(&open, "PdfTrawl"));
        assert!(!robots.is_url_allowed(&closed, "PdfTrawl"));
    }

    #[test]
    fn test_agent_specific_group() {
        let robots =
            ParsedRobots::from_content("User-agent: PdfTrawl\nDisallow: /\n\nUser-agent: *\nAllow: /");
        assert!(!robots.is_allowed("/page", "PdfTrawl"));
        assert!(robots.is_allowed("/page", "OtherBot"));
    }

    #[test]
    fn test_garbage_allows_everything() {
        let robots = ParsedRobots::from_content("<html>not robots</html>");
        assert!(robots.is_allowed("/any", "PdfTrawl"));
    }

    #[test]
    fn test_crawl_delay_groups() {
        let robots = ParsedRobots::from_content(
            "User-agent: PdfTrawl\nCrawl-delay: 2\n\nUser-agent: *\nCrawl-delay: 5\nDisallow: /tmp",
        );
        assert_eq!(robots.crawl_delay("PdfTrawl"), Some(Duration::from_secs(2)));
        assert_eq!(robots.crawl_delay("OtherBot"), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_crawl_delay_shared_group() {
        let robots =
            ParsedRobots::from_content("User-agent: BotA\nUser-agent: pdftrawl\nCrawl-delay: 1.5");
        assert_eq!(robots.crawl_delay("PdfTrawl"), Some(Duration::from_millis(1500)));
        assert_eq!(robots.crawl_delay("BotC"), None);
    }

    #[test]
    fn test_crawl_delay_capped_and_invalid() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 3600");
        assert_eq!(robots.crawl_delay("PdfTrawl"), Some(MAX_CRAWL_DELAY));

        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: soon");
        assert_eq!(robots.crawl_delay("PdfTrawl"), None);
    }
}
