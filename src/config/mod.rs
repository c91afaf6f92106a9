//! Configuration module for pdf-trawl
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use pdf_trawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("trawl.toml")).unwrap();
//! println!("Seed groups: {}", config.groups.len());
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    CacheConfig, Config, CrawlerConfig, GroupConfig, RetryConfig, StorageConfig,
    UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
