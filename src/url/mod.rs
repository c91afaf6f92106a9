//! URL handling for pdf-trawl
//!
//! Normalization (the sole basis for duplicate suppression and cache keys),
//! host extraction for the per-host gates and allowed-domain matching.

mod host;
mod matcher;
mod normalize;

pub use host::{extract_host, host_key, same_host};
pub use matcher::{matches_any, matches_wildcard};
pub use normalize::{cache_key, normalize_url};
