//! Biz-Sweep: a resumable business-search sweeper
//!
//! This crate enumerates every business a paginated, rate-limited search API
//! will return for a set of areas, surviving rate-limit stops and operator
//! kills, and merging many discrete runs into one deduplicated result set.

pub mod config;
pub mod crawler;
pub mod dedup;
pub mod output;
pub mod planner;
pub mod state;
pub mod storage;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Biz-Sweep operations
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid state transition for unit {unit_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        unit_id: String,
        from: state::UnitStatus,
        to: state::UnitStatus,
    },

    #[error("Unit {active} is already in progress; refusing to start {requested}")]
    UnitAlreadyActive { active: String, requested: String },

    #[error("Unit {0} is not known to the crawl ledger")]
    UnknownUnit(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SweepError {
    /// Returns true for errors raised before any fetch because the run
    /// cannot be configured (bad config, missing credential, held lock)
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid area: {0}")]
    InvalidArea(String),

    #[error("Missing API credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("Another sweep holds {} (pid {holder}); remove the file if that process is gone", .path.display())]
    Locked { path: PathBuf, holder: String },
}

/// Result type alias for Biz-Sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlEngine, RunOutcome, RunReport};
pub use planner::{QueryPlanner, SearchUnit};
pub use state::{CrawlState, PageCursor, UnitStatus};
pub use storage::{BusinessRecord, LedgerStore, ResultStore, SqliteStorage};
