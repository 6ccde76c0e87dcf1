//! Shared fixtures: a fake search API, temporary databases, and configs

use async_trait::async_trait;
use biz_sweep::config::Config;
use biz_sweep::crawler::{FetchError, LimiterWindow, SearchClient, SearchPage};
use biz_sweep::planner::{AreaQuery, SearchUnit};
use biz_sweep::state::{PageCursor, UnitProgress};
use biz_sweep::storage::{
    BusinessRecord, LedgerStore, ResultStore, RunRecord, RunStatus, StorageError, StorageResult,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// One request seen by the fake API
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub location: String,
    pub filter: Option<String>,
    pub offset: u32,
    pub limit: u32,
}

impl Call {
    /// Planner probes ask for a single item at offset 0
    pub fn is_probe(&self) -> bool {
        self.offset == 0 && self.limit == 1
    }
}

#[derive(Default)]
struct FakeState {
    datasets: HashMap<String, Vec<BusinessRecord>>,
    calls: Vec<Call>,
    rate_limit_from: Option<usize>,
    stall_from: Option<usize>,
    failures: HashMap<usize, FetchError>,
}

/// In-process search API serving fixed result sets keyed by location
///
/// Clones share state, so a test can keep a handle after moving one into
/// the engine.
#[derive(Clone, Default)]
pub struct FakeApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `records` for searches of `location`
    pub fn with_dataset(self, location: &str, records: Vec<BusinessRecord>) -> Self {
        self.state
            .lock()
            .unwrap()
            .datasets
            .insert(location.to_string(), records);
        self
    }

    /// Answers every call from the `n`th (0-based) on with a rate-limit error
    pub fn rate_limit_from(self, n: usize) -> Self {
        self.state.lock().unwrap().rate_limit_from = Some(n);
        self
    }

    /// Never answers the `n`th (0-based) call or any after it
    pub fn stall_from(self, n: usize) -> Self {
        self.state.lock().unwrap().stall_from = Some(n);
        self
    }

    /// Answers the `n`th (0-based) call with `error`
    pub fn fail_call(self, n: usize, error: FetchError) -> Self {
        self.state.lock().unwrap().failures.insert(n, error);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls that fetched a page rather than probing
    pub fn page_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| !c.is_probe()).collect()
    }

    /// Records the call and builds its answer; `None` if the call stalls
    fn answer(
        &self,
        unit: &SearchUnit,
        cursor: &PageCursor,
    ) -> Option<Result<SearchPage, FetchError>> {
        let mut state = self.state.lock().unwrap();

        let location = match unit.query() {
            AreaQuery::Location(location) => location.clone(),
            AreaQuery::Bounds(bbox) => bbox.canonical(),
        };

        let index = state.calls.len();
        state.calls.push(Call {
            location: location.clone(),
            filter: unit.filter().map(str::to_string),
            offset: cursor.offset,
            limit: cursor.limit,
        });

        if state.stall_from.is_some_and(|n| index >= n) {
            return None;
        }

        if state.rate_limit_from.is_some_and(|n| index >= n) {
            return Some(Err(FetchError::RateLimited(
                "HTTP 429 ACCESS_LIMIT_REACHED".to_string(),
            )));
        }

        if let Some(error) = state.failures.remove(&index) {
            return Some(Err(error));
        }

        let records = state.datasets.get(&location).cloned().unwrap_or_default();
        let start = (cursor.offset as usize).min(records.len());
        let end = (start + cursor.limit as usize).min(records.len());

        Some(Ok(SearchPage {
            total: records.len() as u64,
            raw_count: (end - start) as u32,
            businesses: records[start..end].to_vec(),
        }))
    }
}

#[async_trait]
impl SearchClient for FakeApi {
    async fn fetch_page(
        &self,
        unit: &SearchUnit,
        cursor: &PageCursor,
    ) -> Result<SearchPage, FetchError> {
        match self.answer(unit, cursor) {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

/// Distinct businesses with ids `{prefix}-000`, `{prefix}-001`, ... over `range`
pub fn businesses(prefix: &str, range: std::ops::Range<usize>) -> Vec<BusinessRecord> {
    range
        .map(|i| BusinessRecord::new(format!("{}-{:03}", prefix, i), format!("Shop {}", i)))
        .collect()
}

/// A temporary directory and a database path inside it
pub fn temp_db() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sweep.db");
    (dir, path)
}

/// Builds a config writing to `db_path`, with fast retries
///
/// `body` supplies the remaining sections (`[api]`, `[rate-limit]`,
/// `[search]`, `[[area]]`).
pub fn config_with(db_path: &Path, body: &str) -> Config {
    let content = format!(
        r#"
[retry]
max-attempts = 3
base-delay-ms = 1
max-delay-ms = 4

[output]
database-path = '{}'

{}
"#,
        db_path.display(),
        body
    );
    toml::from_str(&content).unwrap()
}

/// Springfield, IL swept unfiltered with the given request budget
pub fn springfield_config(db_path: &Path, budget: u32) -> Config {
    config_with(
        db_path,
        &format!(
            r#"
[rate-limit]
requests-per-window = {}

[[area]]
location = "Springfield, IL"
"#,
            budget
        ),
    )
}

/// Identifier of the unfiltered root unit of a location
pub fn location_unit_id(location: &str) -> String {
    SearchUnit::new(AreaQuery::Location(location.to_string()), None)
        .id()
        .to_string()
}

/// Store wrapper whose ledger writes start failing after `saves_left` succeed
///
/// Simulates a process dying between storing a page's records and
/// committing its cursor.
pub struct FailingLedger<S> {
    inner: S,
    saves_left: usize,
}

impl<S> FailingLedger<S> {
    pub fn new(inner: S, saves_left: usize) -> Self {
        Self { inner, saves_left }
    }
}

impl<S: ResultStore> ResultStore for FailingLedger<S> {
    fn put(&mut self, record: &BusinessRecord) -> StorageResult<bool> {
        self.inner.put(record)
    }

    fn put_page(&mut self, records: &[BusinessRecord]) -> StorageResult<usize> {
        self.inner.put_page(records)
    }

    fn contains(&self, id: &str) -> StorageResult<bool> {
        self.inner.contains(id)
    }

    fn count(&self) -> StorageResult<u64> {
        self.inner.count()
    }

    fn fetch_batch(
        &self,
        after_seq: i64,
        limit: usize,
    ) -> StorageResult<Vec<(i64, BusinessRecord)>> {
        self.inner.fetch_batch(after_seq, limit)
    }
}

impl<S: LedgerStore> LedgerStore for FailingLedger<S> {
    fn load_progress(&self) -> StorageResult<Vec<UnitProgress>> {
        self.inner.load_progress()
    }

    fn save_progress(&mut self, progress: &UnitProgress) -> StorageResult<()> {
        if self.saves_left == 0 {
            return Err(StorageError::Database("disk went away".to_string()));
        }
        self.saves_left -= 1;
        self.inner.save_progress(progress)
    }

    fn register_units(&mut self, root_id: &str, units: &[SearchUnit]) -> StorageResult<()> {
        self.inner.register_units(root_id, units)
    }

    fn planned_units(&self, root_id: &str) -> StorageResult<Option<Vec<SearchUnit>>> {
        self.inner.planned_units(root_id)
    }

    fn planned_unit(&self, unit_id: &str) -> StorageResult<Option<SearchUnit>> {
        self.inner.planned_unit(unit_id)
    }

    fn count_planned_units(&self) -> StorageResult<u64> {
        self.inner.count_planned_units()
    }

    fn load_limiter_window(&self) -> StorageResult<Option<LimiterWindow>> {
        self.inner.load_limiter_window()
    }

    fn save_limiter_window(&mut self, window: &LimiterWindow) -> StorageResult<()> {
        self.inner.save_limiter_window(window)
    }

    fn begin_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        self.inner.begin_run(config_hash)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        self.inner.finish_run(run_id, status)
    }

    fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        self.inner.latest_run()
    }
}
