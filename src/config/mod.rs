//! Configuration module for Biz-Sweep
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and resolving the API credential from the environment.
//!
//! # Example
//!
//! ```no_run
//! use biz_sweep::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sweep.toml")).unwrap();
//! println!("Sweeping {} areas", config.areas.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ApiConfig, AreaEntry, Config, DedupConfig, OutputConfig, PlannerConfig, RateLimitConfig,
    RetryConfig, SearchConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, resolve_api_key};
pub use validation::validate;
