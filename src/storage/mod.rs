//! Storage module for persisting sweep data
//!
//! This module handles all database operations for the sweeper, including:
//! - SQLite database initialization and schema management
//! - Write-once business records, keyed by external identifier
//! - The crawl ledger: unit progress, stored plans, and the limiter window
//! - Run tracking
//! - The lock file guarding a database against concurrent sweeps

mod lock;
mod schema;
mod sqlite;
mod traits;

pub use lock::LedgerLock;
pub use sqlite::SqliteStorage;
pub use traits::{LedgerStore, RecordIter, ResultStore, StorageError, StorageResult};

use crate::planner::SearchUnit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Opens (or creates) the sweep database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to open or initialize the database
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// One business returned by the search API
///
/// Two records are the same business iff their `id`s match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRecord {
    /// Stable external identifier
    pub id: String,
    pub alias: Option<String>,
    pub name: String,
    pub address: Address,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub phone: Option<String>,
    pub categories: Vec<Category>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub price: Option<String>,
    pub url: Option<String>,
    pub is_closed: Option<bool>,
    pub transactions: Vec<String>,

    /// Search filter of the unit that produced the record
    pub filter: Option<String>,
    /// Identifier of the unit that produced the record
    pub unit_id: String,
    /// Area query of the unit that produced the record
    pub location_query: String,
    pub fetched_at: DateTime<Utc>,
}

impl BusinessRecord {
    /// Creates a record with only an identifier and a name
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alias: None,
            name: name.into(),
            address: Address::default(),
            latitude: None,
            longitude: None,
            phone: None,
            categories: Vec::new(),
            rating: None,
            review_count: None,
            price: None,
            url: None,
            is_closed: None,
            transactions: Vec::new(),
            filter: None,
            unit_id: String::new(),
            location_query: String::new(),
            fetched_at: Utc::now(),
        }
    }

    /// Records which unit produced this record, and when
    pub fn stamp(&mut self, unit: &SearchUnit, fetched_at: DateTime<Utc>) {
        self.filter = unit.filter().map(str::to_string);
        self.unit_id = unit.id().to_string();
        self.location_query = unit.query().to_string();
        self.fetched_at = fetched_at;
    }
}

/// Postal address of a business
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub address3: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub display_address: Vec<String>,
}

/// A category tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub alias: String,
    pub title: String,
}

/// Represents a sweep run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a sweep run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Paused,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Paused => "paused",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "paused" => Some(Self::Paused),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
