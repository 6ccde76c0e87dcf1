//! Search units: one independently paginatable query

use crate::planner::BoundingBox;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Where a search unit looks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaQuery {
    /// Free-text location, e.g. "Springfield, IL" or "Springfield, IL 62701"
    Location(String),

    /// Bounding box, searched as its centre plus a covering radius
    Bounds(BoundingBox),
}

impl AreaQuery {
    /// Canonical text form used to derive unit identifiers
    pub fn canonical(&self) -> String {
        match self {
            Self::Location(location) => format!("location:{}", normalize_text(location)),
            Self::Bounds(bbox) => format!("bbox:{}", bbox.canonical()),
        }
    }
}

impl fmt::Display for AreaQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Location(location) => write!(f, "{}", location),
            Self::Bounds(bbox) => write!(f, "bbox[{}]", bbox.canonical()),
        }
    }
}

/// One independently paginatable query: an area plus an optional filter
///
/// Immutable once planned. The identifier is derived from the parameters only,
/// so planning the same inputs again yields the same identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchUnit {
    id: String,
    query: AreaQuery,
    filter: Option<String>,
    depth: u32,
    possibly_truncated: bool,
}

impl SearchUnit {
    /// Creates a root (depth 0) unit
    pub fn new(query: AreaQuery, filter: Option<String>) -> Self {
        Self::at_depth(query, filter, 0)
    }

    /// Creates a unit produced by `depth` levels of subdivision
    pub fn at_depth(query: AreaQuery, filter: Option<String>, depth: u32) -> Self {
        let filter = filter
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());
        let id = unit_id(&query, filter.as_deref());
        Self {
            id,
            query,
            filter,
            depth,
            possibly_truncated: false,
        }
    }

    /// Marks the unit as one whose results may exceed the pagination ceiling
    pub fn flagged(mut self) -> Self {
        self.possibly_truncated = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn query(&self) -> &AreaQuery {
        &self.query
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn possibly_truncated(&self) -> bool {
        self.possibly_truncated
    }

    /// Short identifier prefix for log lines
    pub fn short_id(&self) -> &str {
        &self.id[..12.min(self.id.len())]
    }
}

impl fmt::Display for SearchUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filter {
            Some(filter) => write!(f, "{} [{}] ({})", self.query, filter, self.short_id()),
            None => write!(f, "{} ({})", self.query, self.short_id()),
        }
    }
}

/// Derives the stable identifier of a unit: hex SHA-256 of its canonical form
pub fn unit_id(query: &AreaQuery, filter: Option<&str>) -> String {
    let canonical = format!(
        "{}|filter:{}",
        query.canonical(),
        filter.map(normalize_text).unwrap_or_default()
    );

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Lowercases, trims, and collapses internal whitespace
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
