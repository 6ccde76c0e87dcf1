//! Crawler module for sweeping the search API
//!
//! This module contains the core crawling logic, including:
//! - The search API client and response normalization
//! - The request budget (rate limiter)
//! - Page fetching with bounded retry
//! - Overall sweep coordination

mod client;
mod engine;
mod fetcher;
mod rate_limiter;
mod yelp;

pub use client::{build_http_client, search_params, FetchError, SearchClient, SearchPage, YelpClient};
pub use engine::{CrawlEngine, RunOutcome, RunReport};
pub use fetcher::{FetchOutcome, LedgerCounter, PageFetcher};
pub use rate_limiter::{LimiterWindow, RateLimiter, StopReason};
