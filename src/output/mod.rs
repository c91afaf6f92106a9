//! Output module for harvest results
//!
//! Reports are plain data; printing them is the only formatting done here.

pub mod stats;

pub use stats::{print_cache_stats, print_summary, Counts, GroupReport, RunSummary};
