//! Per-group and run-wide result statistics
//!
//! Reports are assembled from a discovery result and the outcomes the scheduler
//! produced for it, then printed to stdout by the binary.

use crate::cache::CacheStats;
use crate::crawler::{DiscoveryResult, PageError};
use crate::state::{Outcome, OutcomeState, StopReason};
use std::time::Duration;

/// Counters shared by group reports and the run total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub pages_visited: usize,
    pub pages_from_cache: usize,
    pub candidates_found: usize,
    pub downloaded: usize,
    pub skipped_duplicate: usize,
    pub skipped_invalid: usize,
    pub failed: usize,

    /// Candidates never dispatched because the run deadline passed
    pub undispatched: usize,

    pub total_bytes: u64,
}

impl Counts {
    /// Counts one terminal outcome
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome.state {
            OutcomeState::Downloaded => {
                self.downloaded += 1;
                self.total_bytes += outcome.bytes;
            }
            OutcomeState::SkippedDuplicate => self.skipped_duplicate += 1,
            OutcomeState::SkippedInvalid => self.skipped_invalid += 1,
            OutcomeState::Failed => self.failed += 1,
        }
    }

    pub fn add(&mut self, other: &Counts) {
        self.pages_visited += other.pages_visited;
        self.pages_from_cache += other.pages_from_cache;
        self.candidates_found += other.candidates_found;
        self.downloaded += other.downloaded;
        self.skipped_duplicate += other.skipped_duplicate;
        self.skipped_invalid += other.skipped_invalid;
        self.failed += other.failed;
        self.undispatched += other.undispatched;
        self.total_bytes += other.total_bytes;
    }

    pub fn outcomes(&self) -> usize {
        self.downloaded + self.skipped_duplicate + self.skipped_invalid + self.failed
    }
}

/// Result of one seed group: discovery plus downloads
#[derive(Debug, Clone)]
pub struct GroupReport {
    pub group_id: String,
    pub counts: Counts,
    pub stopped_reason: StopReason,
    pub elapsed: Duration,
    pub outcomes: Vec<Outcome>,

    /// Page branches abandoned during discovery
    pub errors: Vec<PageError>,
}

impl GroupReport {
    pub fn new(discovery: DiscoveryResult, outcomes: Vec<Outcome>, elapsed: Duration) -> Self {
        let mut counts = Counts {
            pages_visited: discovery.pages_visited,
            pages_from_cache: discovery.pages_from_cache,
            candidates_found: discovery.candidates.len(),
            ..Counts::default()
        };
        for outcome in &outcomes {
            counts.record(outcome);
        }
        counts.undispatched = counts.candidates_found.saturating_sub(counts.outcomes());

        Self {
            group_id: discovery.group_id,
            counts,
            stopped_reason: discovery.stopped_reason,
            elapsed,
            outcomes,
            errors: discovery.errors,
        }
    }

    pub fn outcomes_in(&self, state: OutcomeState) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(move |o| o.state == state)
    }
}

/// Aggregate over every group of a run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub run_id: Option<i64>,
    pub groups: Vec<GroupReport>,
    pub totals: Counts,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn new(run_id: Option<i64>, groups: Vec<GroupReport>, elapsed: Duration) -> Self {
        let mut totals = Counts::default();
        for group in &groups {
            totals.add(&group.counts);
        }
        Self {
            run_id,
            groups,
            totals,
            elapsed,
        }
    }

    pub fn group(&self, id: &str) -> Option<&GroupReport> {
        self.groups.iter().find(|g| g.group_id == id)
    }
}

fn print_counts(counts: &Counts) {
    println!(
        "  Pages visited: {} ({} from cache)",
        counts.pages_visited, counts.pages_from_cache
    );
    println!("  Candidates found: {}", counts.candidates_found);
    println!("  Downloaded: {}", counts.downloaded);
    println!("  Skipped (duplicate): {}", counts.skipped_duplicate);
    println!("  Skipped (invalid): {}", counts.skipped_invalid);
    println!("  Failed: {}", counts.failed);
    if counts.undispatched > 0 {
        println!("  Not dispatched (deadline): {}", counts.undispatched);
    }
    println!("  Total size: {}", format_bytes(counts.total_bytes));
}

/// Prints the per-group and aggregate summary to stdout
pub fn print_summary(summary: &RunSummary) {
    println!("=== Harvest Summary ===\n");

    for group in &summary.groups {
        println!(
            "Group '{}' (stopped: {}, {:.1}s):",
            group.group_id,
            group.stopped_reason,
            group.elapsed.as_secs_f64()
        );
        print_counts(&group.counts);

        let failures: Vec<_> = group
            .outcomes_in(OutcomeState::Failed)
            .chain(group.outcomes_in(OutcomeState::SkippedInvalid))
            .collect();
        if !failures.is_empty() {
            println!("  Problems:");
            for outcome in failures {
                println!(
                    "    - {} [{}, {} attempts]: {}",
                    outcome.url,
                    outcome.state,
                    outcome.attempts,
                    outcome.error.as_deref().unwrap_or("")
                );
            }
        }
        if !group.errors.is_empty() {
            println!("  Skipped pages: {}", group.errors.len());
        }
        println!();
    }

    println!("Total ({:.1}s):", summary.elapsed.as_secs_f64());
    print_counts(&summary.totals);
}

/// Prints incremental cache statistics to stdout
pub fn print_cache_stats(stats: &CacheStats) {
    println!("=== Cache Statistics ===\n");
    println!("  Pages: {} ({} fresh)", stats.pages, stats.fresh_pages);
    println!(
        "  Artifacts: {} ({} fresh)",
        stats.artifacts, stats.fresh_artifacts
    );
    println!("  Recorded links: {}", stats.recorded_links);
    println!("  Runs: {}", stats.runs);
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovery(id: &str, candidates: usize) -> DiscoveryResult {
        let page = url::Url::parse("https://example.gov/").unwrap();
        let classification = crate::classifier::classify(&page, "/a.pdf", "", &[]);
        let target = classification.resolved_url.clone().unwrap();
        let candidate = crate::state::Candidate::new(page, target, "", classification);

        DiscoveryResult {
            group_id: id.to_string(),
            candidates: vec![candidate; candidates],
            pages_visited: 3,
            pages_from_cache: 1,
            stopped_reason: StopReason::Exhausted,
            visits: Vec::new(),
            errors: Vec::new(),
            elapsed: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_group_report_counts() {
        let outcomes = vec![
            Outcome::downloaded("https://example.gov/a.pdf", "g/a.pdf", 1000, 1),
            Outcome::duplicate("https://example.gov/b.pdf", None, 0),
            Outcome::invalid("https://example.gov/c.pdf", 1, "invalid: html"),
        ];
        let report = GroupReport::new(discovery("g", 4), outcomes, Duration::from_secs(2));

        assert_eq!(report.counts.pages_visited, 3);
        assert_eq!(report.counts.candidates_found, 4);
        assert_eq!(report.counts.downloaded, 1);
        assert_eq!(report.counts.skipped_duplicate, 1);
        assert_eq!(report.counts.skipped_invalid, 1);
        assert_eq!(report.counts.undispatched, 1);
        assert_eq!(report.counts.total_bytes, 1000);
    }

    #[test]
    fn test_run_summary_totals() {
        let a = GroupReport::new(
            discovery("a", 1),
            vec![Outcome::downloaded("https://example.gov/a.pdf", "a/a.pdf", 10, 1)],
            Duration::ZERO,
        );
        let b = GroupReport::new(
            discovery("b", 1),
            vec![Outcome::failed("https://example.gov/b.pdf", 3, "timeout")],
            Duration::ZERO,
        );
        let summary = RunSummary::new(Some(1), vec![a, b], Duration::from_secs(5));

        assert_eq!(summary.totals.pages_visited, 6);
        assert_eq!(summary.totals.downloaded, 1);
        assert_eq!(summary.totals.failed, 1);
        assert_eq!(summary.totals.total_bytes, 10);
        assert!(summary.group("b").is_some());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
