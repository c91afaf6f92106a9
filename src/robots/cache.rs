//! Robots.txt caching implementation
//!
//! Parsed rules are kept for the process and refreshed once they are more than
//! a day old.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};

/// Parsed robots.txt rules with their fetch time
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub content: ParsedRobots,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(content: ParsedRobots) -> Self {
        Self {
            content,
            fetched_at: Utc::now(),
        }
    }

    /// True when the rules are older than 24 hours
    pub fn is_stale(&self) -> bool {
        self.age() > Duration::hours(24)
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}
