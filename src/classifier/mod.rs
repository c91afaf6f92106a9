//! Candidate classifier
//!
//! Decides, link by link, whether a discovered URL is a PDF candidate or a
//! navigable page. Signals are computed independently (see [`signals`]) and
//! combined by [`signals::score`]:
//!
//! - an extension match is accepted outright (confidence 1.0)
//! - keyword or viewer evidence alone is *tentative* and must be confirmed by a
//!   probe's declared content type before anything is downloaded
//! - a declared non-target content type rejects the link even when the
//!   extension or keywords matched

mod extract;
mod sitemap;
pub mod signals;

pub use extract::{extract_links, resolve_link, DiscoveredLink, ExtractedPage, LinkSource};
pub use signals::{score, Signal};
pub use sitemap::{extract_sitemap, SitemapEntries};

use crate::state::Candidate;
use crate::url::normalize_url;
use signals::push_unique;
use url::Url;

/// The target file extension
pub const TARGET_EXTENSION: &str = ".pdf";

/// MIME types that declare the target format
const TARGET_MIME_TYPES: &[&str] = &["application/pdf", "application/x-pdf", "application/acrobat"];

/// MIME types that say nothing about the format
const GENERIC_MIME_TYPES: &[&str] = &[
    "application/octet-stream",
    "binary/octet-stream",
    "application/force-download",
    "application/download",
    "application/x-download",
];

/// MIME prefixes of formats that are certainly not the target
const NON_TARGET_MIME_PREFIXES: &[&str] = &[
    "text/",
    "image/",
    "audio/",
    "video/",
    "application/xhtml",
    "application/json",
    "application/xml",
    "application/zip",
    "application/msword",
    "application/vnd.",
];

/// Keywords that suggest a link leads to a document
const TYPE_KEYWORDS: &[&str] = &[
    "pdf",
    "download",
    "document",
    "report",
    "manual",
    "guide",
    "handbook",
    "publication",
    "brochure",
    "leaflet",
    "circular",
    "notice",
];

/// URL fragments that suggest a document endpoint
const URL_PATTERNS: &[&str] = &[
    "/download/",
    "/documents/",
    "/document/",
    "/files/",
    "/file/",
    "format=pdf",
    "filetype=pdf",
    "type=pdf",
];

/// Link text that explicitly points at a web page, cancelling text keywords
const PAGE_MARKERS: &[&str] = &["html", "web page", "webpage"];

/// Extensions of resources that are neither pages nor candidates
const NON_PAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".css", ".js", ".zip", ".gz",
    ".tar", ".mp3", ".mp4", ".avi", ".mov", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx",
    ".csv", ".xml", ".json", ".rss",
];

/// Query parameters under which embedded viewers carry the document URL
const VIEWER_PARAMS: &[&str] = &["file", "url", "src", "doc"];

/// Classification of a single link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Strong evidence; may be downloaded without confirmation
    Accepted,
    /// Weak evidence only; needs a confirming probe
    Tentative,
    /// Negative content-type override
    Rejected,
    /// No evidence; a navigable page (or irrelevant resource)
    NotCandidate,
}

impl Verdict {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Tentative => "tentative",
            Self::Rejected => "rejected",
            Self::NotCandidate => "not_candidate",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "accepted" => Some(Self::Accepted),
            "tentative" => Some(Self::Tentative),
            "rejected" => Some(Self::Rejected),
            "not_candidate" => Some(Self::NotCandidate),
            _ => None,
        }
    }
}

/// Result of [`classify`]
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub is_candidate: bool,
    pub confidence: f64,
    pub signals: Vec<Signal>,
    pub verdict: Verdict,

    /// The URL that should be fetched: the link itself, or the document wrapped
    /// by a recognized viewer
    pub resolved_url: Option<Url>,
}

/// Classifies one link found on a page
///
/// # Arguments
///
/// * `page_url` - The page the link was found on (used to resolve relative links)
/// * `link_url` - The raw or absolute link target
/// * `link_text` - Visible text of the link
/// * `attributes` - Attributes of the link element (title, aria-label, ...)
///
/// # Example
///
/// ```
/// use pdf_trawl::classifier::{classify, Verdict};
/// use url::Url;
///
/// let page = Url::parse("https://example.com/library").unwrap();
/// let result = classify(&page, "files/annual.pdf", "Annual report", &[]);
/// assert!(result.is_candidate);
/// assert_eq!(result.verdict, Verdict::Accepted);
/// assert_eq!(result.confidence, 1.0);
/// ```
pub fn classify(
    page_url: &Url,
    link_url: &str,
    link_text: &str,
    attributes: &[(String, String)],
) -> Classification {
    let mut signals = Vec::new();

    let resolved = resolve_link(link_url, page_url).and_then(|u| normalize_url(&u).ok());
    let Some(mut target) = resolved else {
        return Classification {
            is_candidate: false,
            confidence: 0.0,
            signals,
            verdict: Verdict::NotCandidate,
            resolved_url: None,
        };
    };

    if let Some(inner) = unwrap_viewer(&target) {
        push_unique(&mut signals, Signal::Viewer(target.to_string()));
        target = inner;
    }

    if has_target_extension(&target) {
        push_unique(&mut signals, Signal::Extension);
    }

    for keyword in keyword_matches(&target, link_text, attributes) {
        push_unique(&mut signals, Signal::Keyword(keyword));
    }

    let confidence = score(&signals);
    let verdict = verdict_for(&signals);

    Classification {
        is_candidate: matches!(verdict, Verdict::Accepted | Verdict::Tentative),
        confidence,
        signals,
        verdict,
        resolved_url: Some(target),
    }
}

/// Folds a probe's declared content type into a candidate's signals
///
/// Returns the verdict, signals and confidence after the probe. A tentative
/// candidate that the probe does not confirm stays tentative.
pub fn confirm(
    candidate: &Candidate,
    content_type: Option<&str>,
    content_disposition: Option<&str>,
) -> Classification {
    let mut signals = candidate.signals.clone();
    if let Some(signal) = content_type_signal(content_type, content_disposition) {
        push_unique(&mut signals, signal);
    }

    let verdict = verdict_for(&signals);
    Classification {
        is_candidate: matches!(verdict, Verdict::Accepted | Verdict::Tentative),
        confidence: score(&signals),
        signals,
        verdict,
        resolved_url: Some(candidate.url.clone()),
    }
}

/// Interprets a declared content type (and disposition) as a signal
///
/// A disposition naming a `.pdf` file counts as a match when the declared type is
/// missing or generic. Unknown types yield no signal.
pub fn content_type_signal(
    content_type: Option<&str>,
    content_disposition: Option<&str>,
) -> Option<Signal> {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if TARGET_MIME_TYPES.contains(&mime.as_str()) {
        return Some(Signal::ContentType(mime));
    }

    if mime.is_empty() || GENERIC_MIME_TYPES.contains(&mime.as_str()) {
        return content_disposition
            .filter(|d| disposition_names_pdf(d))
            .map(|d| Signal::ContentType(d.trim().to_string()));
    }

    if NON_TARGET_MIME_PREFIXES.iter().any(|p| mime.starts_with(p)) {
        return Some(Signal::NonTarget(mime));
    }

    None
}

/// Returns true when a link that is not a candidate is worth walking into
pub fn is_navigable(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    !path.ends_with(TARGET_EXTENSION) && !NON_PAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Checks a body for the PDF magic bytes
pub fn has_pdf_signature(body: &[u8]) -> bool {
    body.starts_with(b"%PDF-")
}

fn verdict_for(signals: &[Signal]) -> Verdict {
    if signals.iter().any(Signal::is_negative) {
        Verdict::Rejected
    } else if signals.iter().any(Signal::is_strong) {
        Verdict::Accepted
    } else if signals.is_empty() {
        Verdict::NotCandidate
    } else {
        Verdict::Tentative
    }
}

fn has_target_extension(url: &Url) -> bool {
    url.path().to_ascii_lowercase().ends_with(TARGET_EXTENSION)
}

fn disposition_names_pdf(disposition: &str) -> bool {
    let lower = disposition.to_ascii_lowercase();
    lower
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .filter(|(key, _)| key.trim().starts_with("filename"))
        .any(|(_, value)| value.trim().trim_matches('"').ends_with(TARGET_EXTENSION))
}

/// Collects keyword evidence from the link text, attributes and URL
fn keyword_matches(url: &Url, text: &str, attributes: &[(String, String)]) -> Vec<String> {
    let mut found = Vec::new();

    let mut haystack = text.to_lowercase();
    for (name, value) in attributes {
        if name == "download" {
            found.push("download".to_string());
        }
        haystack.push(' ');
        haystack.push_str(&value.to_lowercase());
    }

    if !PAGE_MARKERS.iter().any(|m| haystack.contains(m)) {
        for keyword in TYPE_KEYWORDS {
            if haystack.contains(keyword) && !found.iter().any(|f| f == keyword) {
                found.push(keyword.to_string());
            }
        }
    }

    let url_lower = url.as_str().to_lowercase();
    for pattern in URL_PATTERNS {
        if url_lower.contains(pattern) {
            found.push(pattern.trim_matches('/').to_string());
        }
    }

    found
}

/// Extracts the document URL from a recognized embedded-viewer URL
///
/// Recognized forms are PDF.js-style viewers (`.../viewer.html?file=...`) and
/// document viewer services (`/viewer?url=...`, `/gview?url=...`).
fn unwrap_viewer(url: &Url) -> Option<Url> {
    let path = url.path().to_ascii_lowercase();
    let last = path.rsplit('/').next().unwrap_or_default();
    if !(last.contains("viewer") || last == "gview") {
        return None;
    }

    let inner = url
        .query_pairs()
        .find(|(key, value)| VIEWER_PARAMS.contains(&key.as_ref()) && !value.is_empty())
        .map(|(_, value)| value.into_owned())?;

    let absolute = url.join(&inner).ok()?;
    normalize_url(absolute.as_str()).ok()
}

/// Links classified on one page, split into candidates and navigable pages
#[derive(Debug, Clone, Default)]
pub struct PageLinks {
    pub candidates: Vec<Candidate>,

    /// Normalized URLs of links that are not candidates but can be walked
    pub navigable: Vec<Url>,

    /// Keyword-only candidates are walked too; they may be listing pages
    pub tentative_pages: Vec<Url>,
}

/// Classifies every link discovered on a page
///
/// Candidates are deduplicated within the page by normalized URL; the first
/// occurrence wins unless a later one scores strictly higher.
pub fn classify_links(page_url: &Url, links: &[DiscoveredLink]) -> PageLinks {
    let mut result = PageLinks::default();

    for link in links {
        let classification = classify(page_url, &link.url, &link.text, &link.attributes);
        let Some(target) = classification.resolved_url.clone() else {
            continue;
        };

        if classification.is_candidate {
            let candidate = Candidate::new(page_url.clone(), target.clone(), &link.text, classification.clone());
            match result.candidates.iter_mut().find(|c| c.url == candidate.url) {
                Some(existing) if candidate.confidence > existing.confidence => *existing = candidate,
                Some(_) => {}
                None => result.candidates.push(candidate),
            }

            if classification.verdict == Verdict::Tentative
                && link.source == LinkSource::Anchor
                && is_navigable(&target)
                && !result.tentative_pages.contains(&target)
            {
                result.tentative_pages.push(target);
            }
        } else if link.source == LinkSource::Anchor
            && is_navigable(&target)
            && !result.navigable.contains(&target)
        {
            result.navigable.push(target);
        }
    }

    result
}
