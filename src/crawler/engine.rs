//! Crawl engine - main sweep orchestration logic
//!
//! This module contains the run loop that coordinates:
//! - Loading the crawl ledger, the limiter window, and the dedup key set
//! - Resuming a unit left in progress by a crash or a stop
//! - Planning each area root (or reusing its stored plan)
//! - Fetching, deduplicating, and persisting pages unit by unit
//! - Stopping cleanly when the rate limiter fires
//!
//! The limiter window is saved as each request is sent, so dropping the run
//! future mid-request still leaves the request charged on restart.

use crate::config::Config;
use crate::crawler::{FetchOutcome, PageFetcher, RateLimiter, SearchClient, StopReason};
use crate::dedup::{Deduplicator, Verdict};
use crate::planner::{Expansion, PlanRoot, QueryPlanner, SearchUnit};
use crate::state::{Checkpoint, CrawlState, PageAdvance, PageCursor};
use crate::storage::{BusinessRecord, LedgerStore, ResultStore, RunStatus};
use crate::SweepError;
use chrono::Utc;
use std::collections::HashSet;
use std::time::Instant;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every planned unit is complete
    Complete,

    /// The rate limiter stopped the run; rerun later to continue
    Paused(StopReason),
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub units_planned: u64,
    pub units_completed: u64,
    pub units_truncated: u64,
    pub units_possibly_truncated: u64,
    pub pages_fetched: u64,
    pub requests_issued: u64,
    pub records_new: u64,
    pub records_duplicate: u64,
    pub records_near_duplicate: u64,
}

/// How crawling one unit ended
enum UnitRun {
    Completed,
    Stopped(StopReason),
}

/// Drives a sweep over every planned unit
pub struct CrawlEngine<C: SearchClient, S: ResultStore + LedgerStore + Send> {
    planner: QueryPlanner,
    fetcher: PageFetcher<C>,
    store: S,
    state: CrawlState,
    dedup: Deduplicator,
    first_cursor: PageCursor,
    config_hash: String,
    report: RunReport,
}

impl<C: SearchClient, S: ResultStore + LedgerStore + Send> CrawlEngine<C, S> {
    /// Creates an engine, loading all persisted state from `store`
    ///
    /// # Arguments
    ///
    /// * `config` - The sweep configuration
    /// * `client` - Source of search result pages
    /// * `store` - Result store and crawl ledger
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlEngine)` - Ready to run
    /// * `Err(SweepError)` - The persisted state could not be loaded
    pub fn new(config: &Config, client: C, store: S) -> Result<Self, SweepError> {
        let window = store.load_limiter_window()?;
        let limiter = RateLimiter::from_window(&config.rate_limit, window);
        tracing::info!(
            "{} of {} requests left in the current window",
            limiter.remaining(),
            config.rate_limit.requests_per_window
        );

        let state = CrawlState::load(&store)?;
        let dedup = Deduplicator::load(&store, config.dedup.preload_limit)?;

        Ok(Self {
            planner: QueryPlanner::from_config(config),
            fetcher: PageFetcher::new(client, limiter, config),
            store,
            state,
            dedup,
            first_cursor: PageCursor::first(config.api.page_size, config.api.max_results),
            config_hash: String::new(),
            report: RunReport::default(),
        })
    }

    /// Sets the configuration hash recorded on the run row
    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = config_hash.into();
        self
    }

    /// Runs the sweep until every unit is complete or the limiter stops it
    ///
    /// The limiter window is saved again on every exit path.
    pub async fn run(&mut self) -> Result<RunOutcome, SweepError> {
        let run_id = self.store.begin_run(&self.config_hash)?;
        let start_time = Instant::now();
        tracing::info!("Starting sweep run {}", run_id);

        let result = self.run_units().await;

        let saved = self.store.save_limiter_window(&self.fetcher.limiter().window());

        let status = match &result {
            Ok(RunOutcome::Complete) => RunStatus::Completed,
            Ok(RunOutcome::Paused(_)) => RunStatus::Paused,
            Err(_) => RunStatus::Failed,
        };
        if let Err(e) = self.store.finish_run(run_id, status) {
            tracing::warn!("Failed to record end of run {}: {}", run_id, e);
        }

        let report = self.report();
        tracing::info!(
            "Run {} {}: {} units completed, {} pages, {} requests, {} new records, {} duplicates in {:?}",
            run_id,
            status.to_db_string(),
            report.units_completed,
            report.pages_fetched,
            report.requests_issued,
            report.records_new,
            report.records_duplicate,
            start_time.elapsed()
        );

        match (result, saved) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Err(save_error)) => {
                tracing::warn!("Failed to save rate limit window: {}", save_error);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
        }
    }

    async fn run_units(&mut self) -> Result<RunOutcome, SweepError> {
        if let Some(active) = self.state.in_progress().map(str::to_string) {
            let unit = self
                .store
                .planned_unit(&active)?
                .ok_or(SweepError::UnknownUnit(active))?;

            tracing::info!("Resuming interrupted unit {}", unit);
            if let UnitRun::Stopped(reason) = self.crawl_unit(&unit).await? {
                return Ok(RunOutcome::Paused(reason));
            }
        }

        let roots = self.planner.roots().to_vec();
        tracing::info!("Sweeping {} area roots", roots.len());

        for root in &roots {
            let units = match self.prepare_plan(root).await? {
                Expansion::Units(units) => units,
                Expansion::Stopped(reason) => {
                    tracing::info!("Stopped while planning {}: {}", root.unit, reason);
                    return Ok(RunOutcome::Paused(reason));
                }
            };

            for unit in &units {
                if self.state.status(unit.id()).is_terminal() {
                    continue;
                }

                if let UnitRun::Stopped(reason) = self.crawl_unit(unit).await? {
                    return Ok(RunOutcome::Paused(reason));
                }
            }
        }

        tracing::info!("All planned units are complete");
        Ok(RunOutcome::Complete)
    }

    /// Returns the stored plan of a root, planning and storing it first if needed
    async fn prepare_plan(&mut self, root: &PlanRoot) -> Result<Expansion, SweepError> {
        if let Some(units) = self.state.planned_units(&self.store, root.unit.id())? {
            tracing::debug!("Reusing stored plan of {} ({} units)", root.unit, units.len());
            return Ok(Expansion::Units(units));
        }

        let mut counter = self.fetcher.counter(&mut self.store);
        let expansion = self.planner.expand(root, &mut counter).await?;

        if let Expansion::Units(units) = &expansion {
            self.state
                .register_plan(&mut self.store, root.unit.id(), units)?;
            self.report.units_planned += units.len() as u64;
            tracing::info!("Planned {} as {} units", root.unit, units.len());
        }

        Ok(expansion)
    }

    /// Fetches pages of one unit until it completes or the run must stop
    async fn crawl_unit(&mut self, unit: &SearchUnit) -> Result<UnitRun, SweepError> {
        let mut cursor = self.state.begin(&mut self.store, unit, self.first_cursor)?;

        if cursor.offset == 0 {
            tracing::info!("Crawling {}", unit);
        } else {
            tracing::info!("Crawling {} from offset {}", unit, cursor.offset);
        }

        loop {
            match self.fetcher.fetch(&mut self.store, unit, &cursor).await? {
                FetchOutcome::Stopped(reason) => {
                    tracing::info!(
                        "Stopping at {} offset {}: {}",
                        unit,
                        cursor.offset,
                        reason
                    );
                    return Ok(UnitRun::Stopped(reason));
                }
                FetchOutcome::Aborted { reason } => {
                    tracing::error!(
                        "Aborting unit {} at offset {}: {}",
                        unit,
                        cursor.offset,
                        reason
                    );
                    self.state
                        .commit(&mut self.store, unit.id(), Checkpoint::aborted())?;
                    self.report.units_completed += 1;
                    self.report.units_truncated += 1;
                    return Ok(UnitRun::Completed);
                }
                FetchOutcome::Page {
                    records,
                    total,
                    advance,
                } => {
                    let received = records.len() as u64;

                    // Records first, then the cursor: a crash in between only
                    // re-fetches a page whose records are already stored
                    self.persist_page(unit, records)?;
                    self.report.pages_fetched += 1;

                    match advance {
                        PageAdvance::Next(next) => {
                            self.state.commit(
                                &mut self.store,
                                unit.id(),
                                Checkpoint::advance(next, received),
                            )?;
                            tracing::debug!(
                                "Got {} of {} results for {}",
                                next.offset,
                                total,
                                unit
                            );
                            cursor = next;
                        }
                        PageAdvance::Done { truncated } => {
                            self.state.commit(
                                &mut self.store,
                                unit.id(),
                                Checkpoint::complete(received, truncated),
                            )?;
                            self.report.units_completed += 1;

                            if truncated {
                                self.report.units_truncated += 1;
                                tracing::warn!(
                                    "Completed {} with {} results unreachable",
                                    unit,
                                    total.saturating_sub(cursor.offset as u64 + received)
                                );
                            } else {
                                tracing::info!("Completed {} ({} results)", unit, total);
                            }
                            if unit.possibly_truncated() {
                                self.report.units_possibly_truncated += 1;
                                tracing::warn!(
                                    "{} could not be subdivided below the result ceiling; results may be missing",
                                    unit
                                );
                            }
                            return Ok(UnitRun::Completed);
                        }
                    }
                }
            }
        }
    }

    /// Stamps, deduplicates, and stores one page of records
    fn persist_page(
        &mut self,
        unit: &SearchUnit,
        records: Vec<BusinessRecord>,
    ) -> Result<(), SweepError> {
        let fetched_at = Utc::now();
        let mut seen_in_page = HashSet::new();
        let mut fresh = Vec::with_capacity(records.len());
        let mut duplicates = 0u64;

        for mut record in records {
            record.stamp(unit, fetched_at);

            if !seen_in_page.insert(record.id.clone()) {
                duplicates += 1;
                continue;
            }

            match self.dedup.check(&self.store, &record)? {
                Verdict::Duplicate => duplicates += 1,
                Verdict::New => fresh.push(record),
                Verdict::NearDuplicate { of } => {
                    tracing::warn!(
                        "{} ({}) looks like already-stored {}; keeping both",
                        record.id,
                        record.name,
                        of
                    );
                    self.report.records_near_duplicate += 1;
                    fresh.push(record);
                }
            }
        }

        let inserted = self.store.put_page(&fresh)?;
        for record in &fresh {
            self.dedup.remember(record);
        }

        self.report.records_new += inserted as u64;
        self.report.records_duplicate += duplicates + (fresh.len() - inserted) as u64;

        Ok(())
    }

    /// Counters for this run so far
    pub fn report(&self) -> RunReport {
        RunReport {
            requests_issued: self.fetcher.requests_issued(),
            ..self.report.clone()
        }
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consumes the engine, returning the store
    pub fn into_store(self) -> S {
        self.store
    }
}
