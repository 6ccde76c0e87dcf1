//! Storage traits and error types
//!
//! This module defines the trait interfaces for storage backends and
//! associated error types.

use crate::crawler::LimiterWindow;
use crate::planner::SearchUnit;
use crate::state::UnitProgress;
use crate::storage::{BusinessRecord, RunRecord, RunStatus};
use std::collections::VecDeque;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Write-once store of business records
pub trait ResultStore {
    /// Stores a record unless one with the same identifier exists
    ///
    /// # Returns
    ///
    /// `true` if the record was newly inserted
    fn put(&mut self, record: &BusinessRecord) -> StorageResult<bool>;

    /// Stores a page of records in one transaction
    ///
    /// # Returns
    ///
    /// The number of records newly inserted
    fn put_page(&mut self, records: &[BusinessRecord]) -> StorageResult<usize>;

    /// Checks whether a record with this identifier is stored
    fn contains(&self, id: &str) -> StorageResult<bool>;

    /// Counts stored records
    fn count(&self) -> StorageResult<u64>;

    /// Fetches up to `limit` records stored after insertion sequence `after_seq`
    ///
    /// Returns `(sequence, record)` pairs in insertion order.
    fn fetch_batch(&self, after_seq: i64, limit: usize)
        -> StorageResult<Vec<(i64, BusinessRecord)>>;

    /// Lazily iterates every stored record in insertion order
    ///
    /// Each call starts again from the first record.
    fn iterate(&self) -> RecordIter<'_, Self>
    where
        Self: Sized,
    {
        RecordIter::new(self)
    }
}

/// Persistence for the crawl ledger and run history
pub trait LedgerStore {
    // ===== Unit Progress =====

    /// Loads the progress of every unit ever started
    fn load_progress(&self) -> StorageResult<Vec<UnitProgress>>;

    /// Inserts or replaces the progress of one unit
    fn save_progress(&mut self, progress: &UnitProgress) -> StorageResult<()>;

    // ===== Plans =====

    /// Stores the ordered unit list planned for a root
    fn register_units(&mut self, root_id: &str, units: &[SearchUnit]) -> StorageResult<()>;

    /// Loads the unit list planned for a root, or `None` if never planned
    fn planned_units(&self, root_id: &str) -> StorageResult<Option<Vec<SearchUnit>>>;

    /// Looks up a planned unit by its identifier
    fn planned_unit(&self, unit_id: &str) -> StorageResult<Option<SearchUnit>>;

    /// Counts distinct planned units across all roots
    fn count_planned_units(&self) -> StorageResult<u64>;

    // ===== Rate Limiter =====

    fn load_limiter_window(&self) -> StorageResult<Option<LimiterWindow>>;

    fn save_limiter_window(&mut self, window: &LimiterWindow) -> StorageResult<()>;

    // ===== Run Management =====

    /// Creates a new run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn begin_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Records how a run ended, with a finish timestamp
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Gets the most recent run
    fn latest_run(&self) -> StorageResult<Option<RunRecord>>;
}

/// Number of records read per batch while iterating
const ITER_BATCH_SIZE: usize = 500;

/// Lazy, keyset-paginated iterator over stored records
pub struct RecordIter<'a, S: ResultStore + ?Sized> {
    store: &'a S,
    after_seq: i64,
    buffer: VecDeque<BusinessRecord>,
    exhausted: bool,
}

impl<'a, S: ResultStore + ?Sized> RecordIter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            after_seq: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }
}

impl<S: ResultStore + ?Sized> Iterator for RecordIter<'_, S> {
    type Item = StorageResult<BusinessRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self.store.fetch_batch(self.after_seq, ITER_BATCH_SIZE) {
                Ok(batch) => {
                    if batch.len() < ITER_BATCH_SIZE {
                        self.exhausted = true;
                    }
                    if let Some((seq, _)) = batch.last() {
                        self.after_seq = *seq;
                    }
                    self.buffer.extend(batch.into_iter().map(|(_, record)| record));
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }

        self.buffer.pop_front().map(Ok)
    }
}
