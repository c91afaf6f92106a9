//! Data model shared by the discovery engine, the scheduler and the reporting layer
//!
//! # Components
//!
//! - `SeedGroup`: starting URLs plus the budgets of one discovery walk
//! - `VisitRecord` / `StopReason`: what a walk visited and why it ended
//! - `Candidate`: a link the classifier believes is a PDF
//! - `DownloadTask` / `Outcome`: scheduler work items and their terminal results

mod candidate;
mod outcome;
mod seed_group;
mod visit;

pub use candidate::Candidate;
pub use outcome::{DownloadTask, Outcome, OutcomeState};
pub use seed_group::SeedGroup;
pub use visit::{StopReason, VisitRecord};
