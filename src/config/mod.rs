//! Configuration module for dirtyrss
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every option has a default, so an empty file (or no file) is a valid setup.
//!
//! # Example
//!
//! ```no_run
//! use dirtyrss::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("dirtyrss.toml")).unwrap();
//! println!("Crawler will issue {} requests/sec", config.crawler.requests_per_second);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{CacheConfig, Config, CrawlerConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
