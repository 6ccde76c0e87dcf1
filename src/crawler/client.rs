//! Search API client
//!
//! This module handles all HTTP requests to the search API, including:
//! - Building the HTTP client with a proper user agent string
//! - Bearer authentication
//! - Translating a search unit and cursor into query parameters
//! - Error classification (rate limited, transient, fatal)

use crate::config::ApiConfig;
use crate::crawler::yelp::{classify_error_response, RawSearchResponse};
use crate::planner::{AreaQuery, SearchUnit};
use crate::state::PageCursor;
use crate::storage::BusinessRecord;
use crate::{ConfigError, SweepError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Path of the business search endpoint, relative to the API base URL
const SEARCH_PATH: &str = "/v3/businesses/search";

/// One page of search results
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    /// Total results the API reports for the query
    pub total: u64,
    /// Items the API returned, including any dropped for lacking an id
    pub raw_count: u32,
    pub businesses: Vec<BusinessRecord>,
}

/// Classified failure of a single request
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The API refused the request because of its rate limit
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Network failure, timeout, or server error; worth retrying
    #[error("transient failure: {0}")]
    Transient(String),

    /// Client error or malformed response; retrying will not help
    #[error("fatal response (status {status:?}): {detail}")]
    Fatal { status: Option<u16>, detail: String },
}

/// Source of search result pages
///
/// Implementations issue exactly one request per call and do no retrying
/// of their own.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn fetch_page(
        &self,
        unit: &SearchUnit,
        cursor: &PageCursor,
    ) -> Result<SearchPage, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The API configuration (for the request timeout)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    let user_agent = format!("biz-sweep/{}", env!("CARGO_PKG_VERSION"));

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Client for the Yelp Fusion business search API
pub struct YelpClient {
    http: Client,
    endpoint: Url,
    api_key: String,
}

impl YelpClient {
    /// Creates a client for the API described by `config`
    ///
    /// # Arguments
    ///
    /// * `config` - The API configuration
    /// * `api_key` - The bearer token, already resolved from the environment
    pub fn new(config: &ApiConfig, api_key: String) -> Result<Self, SweepError> {
        let endpoint = Url::parse(&config.base_url)
            .and_then(|base| base.join(SEARCH_PATH))
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

        Ok(Self {
            http: build_http_client(config)?,
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Query parameters for one page of a unit
pub fn search_params(unit: &SearchUnit, cursor: &PageCursor) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();

    if let Some(term) = unit.filter() {
        params.push(("term", term.to_string()));
    }

    match unit.query() {
        AreaQuery::Location(location) => params.push(("location", location.clone())),
        AreaQuery::Bounds(bbox) => {
            let (latitude, longitude) = bbox.center();
            params.push(("latitude", format!("{:.6}", latitude)));
            params.push(("longitude", format!("{:.6}", longitude)));
            params.push(("radius", bbox.search_radius_m().to_string()));
        }
    }

    params.push(("sort_by", "distance".to_string()));
    params.push(("limit", cursor.limit.to_string()));
    params.push(("offset", cursor.offset.to_string()));
    params
}

#[async_trait]
impl SearchClient for YelpClient {
    async fn fetch_page(
        &self,
        unit: &SearchUnit,
        cursor: &PageCursor,
    ) -> Result<SearchPage, FetchError> {
        let response = self
            .http
            .get(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .query(&search_params(unit, cursor))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Transient("request timeout".to_string())
                } else if e.is_connect() {
                    FetchError::Transient(format!("connection failed: {}", e))
                } else {
                    FetchError::Transient(e.to_string())
                }
            })?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::RateLimited(format!(
                "HTTP 429 {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        if status.is_server_error() {
            return Err(FetchError::Transient(format!("HTTP {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transient(format!("failed to read body: {}", e)))?;

        if !status.is_success() {
            return Err(classify_error_response(status.as_u16(), &body));
        }

        let parsed: RawSearchResponse =
            serde_json::from_str(&body).map_err(|e| FetchError::Fatal {
                status: Some(status.as_u16()),
                detail: format!("malformed response: {}", e),
            })?;

        let raw = parsed.businesses.unwrap_or_default();
        let received = raw.len();
        let businesses: Vec<BusinessRecord> =
            raw.into_iter().filter_map(|b| b.into_record()).collect();

        if businesses.len() < received {
            tracing::debug!(
                "Dropped {} businesses without an id for {}",
                received - businesses.len(),
                unit
            );
        }

        Ok(SearchPage {
            total: parsed.total,
            raw_count: received as u32,
            businesses,
        })
    }
}
