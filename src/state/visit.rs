use chrono::{DateTime, Utc};
use std::fmt;
use url::Url;

/// A page visited during one discovery walk
#[derive(Debug, Clone, PartialEq)]
pub struct VisitRecord {
    /// Normalized page URL
    pub url: Url,

    /// Depth at first visit (seeds are depth 0)
    pub depth: u32,

    pub visited_at: DateTime<Utc>,

    /// The page was skipped because its cache entry was fresh
    pub from_cache: bool,
}

/// Why a discovery walk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// The frontier ran empty
    Exhausted,
    /// The next page in the frontier was deeper than the depth budget
    DepthLimit,
    /// The page budget was used up
    PageLimit,
    /// The group time limit or the run deadline passed
    TimeLimit,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exhausted => "exhausted",
            Self::DepthLimit => "depth_limit",
            Self::PageLimit => "page_limit",
            Self::TimeLimit => "time_limit",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
