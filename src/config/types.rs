use crate::planner::BoundingBox;
use serde::Deserialize;

/// Main configuration structure for Biz-Sweep
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub dedup: DedupConfig,

    pub output: OutputConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(rename = "area", default)]
    pub areas: Vec<AreaEntry>,
}

impl Config {
    /// Search filters to plan each area with, in order
    ///
    /// `None` stands for an unfiltered search. With no filters configured the
    /// sweep is unfiltered.
    pub fn effective_filters(&self) -> Vec<Option<String>> {
        let mut filters: Vec<Option<String>> = self
            .search
            .filters
            .iter()
            .map(|f| Some(f.trim().to_string()))
            .collect();

        if self.search.include_unfiltered || filters.is_empty() {
            filters.push(None);
        }

        filters
    }

    /// Replaces configured areas and filters with ones given on the command line
    ///
    /// Empty `areas`/`filters` leave the configured values untouched.
    pub fn apply_overrides(&mut self, areas: &[String], filters: &[String], include_unfiltered: bool) {
        if !areas.is_empty() {
            self.areas = areas
                .iter()
                .map(|location| AreaEntry {
                    location: Some(location.clone()),
                    partitions: Vec::new(),
                    bbox: None,
                })
                .collect();
        }

        if !filters.is_empty() {
            self.search.filters = filters.to_vec();
            self.search.include_unfiltered = include_unfiltered;
        } else if include_unfiltered {
            self.search.include_unfiltered = true;
        }
    }
}

/// Search API endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the search API
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(rename = "key-env", default = "default_key_env")]
    pub key_env: String,

    /// Results requested per page
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Pagination ceiling: the API refuses offsets past this many results
    #[serde(rename = "max-results", default = "default_max_results")]
    pub max_results: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            key_env: default_key_env(),
            page_size: default_page_size(),
            max_results: default_max_results(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Request budget matching the API's published limit
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    #[serde(rename = "requests-per-window", default = "default_requests_per_window")]
    pub requests_per_window: u32,

    /// Window length (seconds)
    #[serde(rename = "window-secs", default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: default_requests_per_window(),
            window_secs: default_window_secs(),
        }
    }
}

/// Bounded retry for transient fetch failures
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per page, including the first
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds); doubles on each retry
    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on a single retry delay (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Query planner configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    /// Maximum quadrant subdivision depth for bounding-box areas
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

/// Deduplication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    /// Stored records above which the key set is no longer preloaded
    #[serde(rename = "preload-limit", default = "default_preload_limit")]
    pub preload_limit: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            preload_limit: default_preload_limit(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database holding results and the crawl ledger
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Search term configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchConfig {
    /// Attribute filters / search terms (e.g. "Black owned")
    #[serde(default)]
    pub filters: Vec<String>,

    /// Also run an unfiltered search for every area
    #[serde(rename = "include-unfiltered", default)]
    pub include_unfiltered: bool,
}

/// One target area
///
/// Exactly one of `location` or `bbox` must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct AreaEntry {
    /// Free-text location, e.g. "Springfield, IL"
    #[serde(default)]
    pub location: Option<String>,

    /// ZIP codes searched instead of the whole location when it has more
    /// results than pagination can reach
    #[serde(default)]
    pub partitions: Vec<String>,

    /// Geographic bounding box, subdivided into quadrants as needed
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

fn default_base_url() -> String {
    "https://api.yelp.com".to_string()
}

fn default_key_env() -> String {
    "YELP_API_KEY".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_max_results() -> u32 {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_requests_per_window() -> u32 {
    5000
}

fn default_window_secs() -> u64 {
    86_400
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_depth() -> u32 {
    4
}

fn default_preload_limit() -> u64 {
    2_000_000
}
