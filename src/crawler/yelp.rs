//! Yelp Fusion response shapes and their normalization into `BusinessRecord`s
//!
//! Yelp omits fields, sends explicit nulls, and sends empty strings for
//! missing address parts; all of that is smoothed out here so nothing past
//! the client boundary sees the raw shape.

use crate::crawler::FetchError;
use crate::storage::{Address, BusinessRecord, Category};
use serde::Deserialize;

/// Error codes Yelp uses for quota and throttling responses
const RATE_LIMIT_CODES: &[&str] = &["ACCESS_LIMIT_REACHED", "TOO_MANY_REQUESTS_PER_SECOND"];

#[derive(Debug, Deserialize)]
pub(crate) struct RawSearchResponse {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub businesses: Option<Vec<RawBusiness>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawBusiness {
    id: Option<String>,
    alias: Option<String>,
    name: Option<String>,
    coordinates: Option<RawCoordinates>,
    location: Option<RawLocation>,
    phone: Option<String>,
    categories: Option<Vec<RawCategory>>,
    rating: Option<f64>,
    review_count: Option<u32>,
    price: Option<String>,
    url: Option<String>,
    is_closed: Option<bool>,
    transactions: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCoordinates {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLocation {
    address1: Option<String>,
    address2: Option<String>,
    address3: Option<String>,
    city: Option<String>,
    state: Option<String>,
    zip_code: Option<String>,
    country: Option<String>,
    display_address: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCategory {
    alias: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawErrorBody {
    error: Option<RawError>,
}

#[derive(Debug, Deserialize)]
struct RawError {
    code: Option<String>,
    description: Option<String>,
}

/// Turns empty or whitespace-only strings into `None`
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RawBusiness {
    /// Normalizes into a record; businesses without an identifier are dropped
    pub(crate) fn into_record(self) -> Option<BusinessRecord> {
        let id = non_empty(self.id)?;
        let name = non_empty(self.name).unwrap_or_default();

        let mut record = BusinessRecord::new(id, name);
        record.alias = non_empty(self.alias);

        if let Some(location) = self.location {
            record.address = Address {
                address1: non_empty(location.address1),
                address2: non_empty(location.address2),
                address3: non_empty(location.address3),
                city: non_empty(location.city),
                state: non_empty(location.state),
                zip_code: non_empty(location.zip_code),
                country: non_empty(location.country),
                display_address: location.display_address.unwrap_or_default(),
            };
        }

        if let Some(coordinates) = self.coordinates {
            record.latitude = coordinates.latitude;
            record.longitude = coordinates.longitude;
        }

        record.phone = non_empty(self.phone);
        record.categories = self
            .categories
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| {
                Some(Category {
                    alias: non_empty(c.alias)?,
                    title: non_empty(c.title).unwrap_or_default(),
                })
            })
            .collect();
        record.rating = self.rating;
        record.review_count = self.review_count;
        record.price = non_empty(self.price);
        record.url = non_empty(self.url);
        record.is_closed = self.is_closed;
        record.transactions = self.transactions.unwrap_or_default();

        Some(record)
    }
}

/// Classifies a non-success, non-5xx response from its status and body
pub(crate) fn classify_error_response(status: u16, body: &str) -> FetchError {
    let error = serde_json::from_str::<RawErrorBody>(body)
        .ok()
        .and_then(|b| b.error);

    let (code, description) = match error {
        Some(e) => (e.code.unwrap_or_default(), e.description.unwrap_or_default()),
        None => (String::new(), body.chars().take(200).collect()),
    };

    if RATE_LIMIT_CODES.contains(&code.as_str()) {
        return FetchError::RateLimited(format!("{}: {}", code, description));
    }

    FetchError::Fatal {
        status: Some(status),
        detail: if code.is_empty() {
            description
        } else {
            format!("{}: {}", code, description)
        },
    }
}
