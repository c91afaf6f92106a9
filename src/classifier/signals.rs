//! Discovery signals and the scoring function that combines them
//!
//! Each signal is computed independently and carries a weight in `0..=1`. The
//! confidence of a link is the noisy-OR of its positive weights:
//!
//! ```text
//! confidence = 1 - Π (1 - weight_i)
//! ```
//!
//! so no single weak signal is authoritative, while an extension match (weight 1.0)
//! saturates the score. A [`Signal::NonTarget`] forces the confidence to zero.

use std::fmt;

/// Weight of a URL path ending in `.pdf`
pub const EXTENSION_WEIGHT: f64 = 1.0;

/// Weight of a declared content type (or content disposition) naming a PDF
pub const CONTENT_TYPE_WEIGHT: f64 = 0.95;

/// Weight of a recognized embedded-viewer wrapper
pub const VIEWER_WEIGHT: f64 = 0.6;

/// Weight of a type keyword in the link text, attributes or URL
pub const KEYWORD_WEIGHT: f64 = 0.4;

/// A single piece of evidence about whether a link points at a PDF
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Signal {
    /// The URL path ends in the target extension
    Extension,

    /// A type keyword matched; carries the keyword
    Keyword(String),

    /// The declared content type matched the target; carries the declared value
    ContentType(String),

    /// The link was wrapped by an embedded viewer; carries the viewer URL
    Viewer(String),

    /// The declared content type is a known non-target type; carries the declared value
    NonTarget(String),
}

impl Signal {
    /// Returns the weight this signal contributes to the confidence score
    pub fn weight(&self) -> f64 {
        match self {
            Self::Extension => EXTENSION_WEIGHT,
            Self::ContentType(_) => CONTENT_TYPE_WEIGHT,
            Self::Viewer(_) => VIEWER_WEIGHT,
            Self::Keyword(_) => KEYWORD_WEIGHT,
            Self::NonTarget(_) => 0.0,
        }
    }

    /// Returns true for signals that can accept a candidate on their own
    pub fn is_strong(&self) -> bool {
        matches!(self, Self::Extension | Self::ContentType(_))
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, Self::NonTarget(_))
    }

    /// Parses the form produced by `Display`
    ///
    /// Returns None if the string doesn't name a known signal.
    pub fn from_db_string(s: &str) -> Option<Self> {
        if s == "extension" {
            return Some(Self::Extension);
        }
        let (kind, detail) = s.split_once(':')?;
        let detail = detail.to_string();
        match kind {
            "keyword" => Some(Self::Keyword(detail)),
            "content-type" => Some(Self::ContentType(detail)),
            "viewer" => Some(Self::Viewer(detail)),
            "non-target" => Some(Self::NonTarget(detail)),
            _ => None,
        }
    }
}

/// Joins signals into the single-column form stored in the cache
pub fn signals_to_db_string(signals: &[Signal]) -> String {
    signals
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inverse of [`signals_to_db_string`]; unknown entries are dropped
pub fn signals_from_db_string(s: &str) -> Vec<Signal> {
    s.lines().filter_map(Signal::from_db_string).collect()
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extension => write!(f, "extension"),
            Self::Keyword(k) => write!(f, "keyword:{}", k),
            Self::ContentType(t) => write!(f, "content-type:{}", t),
            Self::Viewer(v) => write!(f, "viewer:{}", v),
            Self::NonTarget(t) => write!(f, "non-target:{}", t),
        }
    }
}

/// Combines a set of signals into a confidence score in `0..=1`
///
/// Duplicated keyword signals only count once per distinct keyword because the
/// caller deduplicates them; the score is order-independent.
pub fn score(signals: &[Signal]) -> f64 {
    if signals.iter().any(Signal::is_negative) {
        return 0.0;
    }

    let miss: f64 = signals
        .iter()
        .map(|s| 1.0 - s.weight().clamp(0.0, 1.0))
        .product();

    (1.0 - miss).clamp(0.0, 1.0)
}

/// Pushes a signal unless an equal one is already present
pub(crate) fn push_unique(signals: &mut Vec<Signal>, signal: Signal) {
    if !signals.contains(&signal) {
        signals.push(signal);
    }
}
