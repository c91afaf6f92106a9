use crate::classifier::{Classification, Signal, Verdict};
use crate::url::host_key;
use url::Url;

/// A link the classifier believes points at a PDF
///
/// Candidates are produced once by the classifier (or replayed from the cache)
/// and consumed once by the scheduler; they are never mutated in between.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Page the link was found on
    pub source_page: Url,

    /// Normalized candidate URL (viewer wrappers already removed)
    pub url: Url,

    pub link_text: String,

    pub signals: Vec<Signal>,

    /// Noisy-OR confidence in `0..=1`
    pub confidence: f64,

    pub verdict: Verdict,
}

impl Candidate {
    pub fn new(
        source_page: Url,
        url: Url,
        link_text: &str,
        classification: Classification,
    ) -> Self {
        Self {
            source_page,
            url,
            link_text: link_text.to_string(),
            signals: classification.signals,
            confidence: classification.confidence,
            verdict: classification.verdict,
        }
    }

    /// The incremental-cache key of this candidate
    pub fn cache_key(&self) -> &str {
        self.url.as_str()
    }

    pub fn host(&self) -> Option<String> {
        host_key(&self.url)
    }

    /// Returns true when the URL or link text mentions one of the document types
    ///
    /// An empty filter keeps every candidate.
    pub fn matches_document_types(&self, document_types: &[String]) -> bool {
        if document_types.is_empty() {
            return true;
        }

        let url = self.url.as_str().to_lowercase();
        let text = self.link_text.to_lowercase();
        document_types.iter().any(|t| {
            let t = t.to_lowercase();
            url.contains(&t) || text.contains(&t)
        })
    }
}
