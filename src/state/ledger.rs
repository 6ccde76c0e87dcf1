//! The crawl ledger: per-unit progress, loaded at startup and committed after
//! every persisted page

use crate::planner::SearchUnit;
use crate::state::{PageCursor, UnitStatus};
use crate::storage::LedgerStore;
use crate::SweepError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Progress of one search unit
#[derive(Debug, Clone, PartialEq)]
pub struct UnitProgress {
    pub unit_id: String,
    pub status: UnitStatus,
    /// Cursor of the next page to fetch; `None` once complete
    pub next_cursor: Option<PageCursor>,
    /// Some results could not be reached (pagination ceiling or an aborted unit)
    pub truncated: bool,
    /// The planner could not split the unit below the result ceiling
    pub possibly_truncated: bool,
    pub pages_fetched: u32,
    pub records_seen: u64,
    pub last_updated: DateTime<Utc>,
}

/// A progress step for one unit, applied by [`CrawlState::commit`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
    next: Option<PageCursor>,
    records: u64,
    pages: u32,
    truncated: bool,
}

impl Checkpoint {
    /// One page stored; more pages follow from `next`
    pub fn advance(next: PageCursor, records: u64) -> Self {
        Self {
            next: Some(next),
            records,
            pages: 1,
            truncated: false,
        }
    }

    /// The final page stored
    pub fn complete(records: u64, truncated: bool) -> Self {
        Self {
            next: None,
            records,
            pages: 1,
            truncated,
        }
    }

    /// The unit was given up on without storing another page
    pub fn aborted() -> Self {
        Self {
            next: None,
            records: 0,
            pages: 0,
            truncated: true,
        }
    }

    fn target_status(&self) -> UnitStatus {
        if self.next.is_some() {
            UnitStatus::InProgress
        } else {
            UnitStatus::Complete
        }
    }
}

/// Unit counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub pending: u64,
    pub in_progress: u64,
    pub complete: u64,
    pub truncated: u64,
    /// Started units the planner flagged as possibly truncated
    pub possibly_truncated: u64,
}

/// In-memory view of the crawl ledger
///
/// Every mutation is written to the store first; memory is only updated once
/// the write has succeeded, so the in-memory view never runs ahead of what is
/// durable.
#[derive(Debug, Default)]
pub struct CrawlState {
    units: HashMap<String, UnitProgress>,
    in_progress: Option<String>,
}

impl CrawlState {
    /// Reconstructs the ledger from the store
    ///
    /// An empty store yields an empty ledger (first run).
    pub fn load<S: LedgerStore + ?Sized>(store: &S) -> Result<Self, SweepError> {
        let mut state = Self::default();

        for progress in store.load_progress()? {
            if progress.status == UnitStatus::InProgress {
                match &state.in_progress {
                    None => state.in_progress = Some(progress.unit_id.clone()),
                    Some(active) => tracing::warn!(
                        "Ledger has more than one unit in progress ({} and {}); resuming {} first",
                        active,
                        progress.unit_id,
                        active
                    ),
                }
            }
            state.units.insert(progress.unit_id.clone(), progress);
        }

        tracing::debug!(
            "Loaded crawl ledger with {} units, {} in progress",
            state.units.len(),
            state.in_progress.iter().count()
        );

        Ok(state)
    }

    /// Status of a unit; units never seen are pending
    pub fn status(&self, unit_id: &str) -> UnitStatus {
        self.units
            .get(unit_id)
            .map(|p| p.status)
            .unwrap_or(UnitStatus::Pending)
    }

    pub fn progress(&self, unit_id: &str) -> Option<&UnitProgress> {
        self.units.get(unit_id)
    }

    /// The unit currently in progress, if any
    pub fn in_progress(&self) -> Option<&str> {
        self.in_progress.as_deref()
    }

    /// Persists the planned unit list of a root
    pub fn register_plan<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        root_id: &str,
        units: &[SearchUnit],
    ) -> Result<(), SweepError> {
        store.register_units(root_id, units)?;
        Ok(())
    }

    /// Returns the stored plan of a root, or `None` if it was never planned
    pub fn planned_units<S: LedgerStore + ?Sized>(
        &self,
        store: &S,
        root_id: &str,
    ) -> Result<Option<Vec<SearchUnit>>, SweepError> {
        Ok(store.planned_units(root_id)?)
    }

    /// Marks a unit in progress and returns the cursor to fetch next
    ///
    /// A unit already in progress resumes from its last committed cursor;
    /// otherwise it starts at `initial`, carrying the planner's
    /// possibly-truncated flag into its progress.
    ///
    /// # Errors
    ///
    /// * `UnitAlreadyActive` - a different unit is in progress
    /// * `InvalidTransition` - the unit is already complete
    pub fn begin<S: LedgerStore + ?Sized>(
        &mut self,
        store: &mut S,
        unit: &SearchUnit,
        initial: PageCursor,
    ) -> Result<PageCursor, SweepError> {
        let unit_id = unit.id();
        self.ensure_not_other_active(unit_id)?;

        let current = self.status(unit_id);
        if !current.can_transition_to(UnitStatus::InProgress) {
            return Err(SweepError::InvalidTransition {
                unit_id: unit_id.to_string(),
                from: current,
                to: UnitStatus::InProgress,
            });
        }

        if let Some(cursor) = self.units.get(unit_id).and_then(|p| p.next_cursor) {
            self.in_progress = Some(unit_id.to_string());
            return Ok(cursor);
        }

        let progress = UnitProgress {
            unit_id: unit_id.to_string(),
            status: UnitStatus::InProgress,
            next_cursor: Some(initial),
            truncated: false,
            possibly_truncated: unit.possibly_truncated(),
            pages_fetched: 0,
            records_seen: 0,
            last_updated: Utc::now(),
        };

        store.save_progress(&progress)?;
        self.units.insert(unit_id.to_string(), progress);
        self.in_progress = Some(unit_id.to_string());

        Ok(initial)
    }

    /// Durably records a progress step for a unit
    ///
    /// Call only after the page's records have been persisted.
    pub fn commit<S: LedgerStore + ?Sized>(
        &mut self,
        store: &mut S,
        unit_id: &str,
        checkpoint: Checkpoint,
    ) -> Result<(), SweepError> {
        self.ensure_not_other_active(unit_id)?;

        let current = self
            .units
            .get(unit_id)
            .ok_or_else(|| SweepError::UnknownUnit(unit_id.to_string()))?;

        let target = checkpoint.target_status();
        if !current.status.can_transition_to(target) {
            return Err(SweepError::InvalidTransition {
                unit_id: unit_id.to_string(),
                from: current.status,
                to: target,
            });
        }

        let updated = UnitProgress {
            unit_id: unit_id.to_string(),
            status: target,
            next_cursor: checkpoint.next,
            truncated: current.truncated || checkpoint.truncated,
            possibly_truncated: current.possibly_truncated,
            pages_fetched: current.pages_fetched + checkpoint.pages,
            records_seen: current.records_seen + checkpoint.records,
            last_updated: Utc::now(),
        };

        store.save_progress(&updated)?;

        self.in_progress = if target == UnitStatus::InProgress {
            Some(unit_id.to_string())
        } else {
            None
        };
        self.units.insert(unit_id.to_string(), updated);

        Ok(())
    }

    /// Counts units by status; `planned_total` is the number of planned units
    pub fn summary(&self, planned_total: u64) -> LedgerSummary {
        let mut summary = LedgerSummary::default();

        for progress in self.units.values() {
            match progress.status {
                UnitStatus::Pending => {}
                UnitStatus::InProgress => summary.in_progress += 1,
                UnitStatus::Complete => summary.complete += 1,
            }
            if progress.truncated {
                summary.truncated += 1;
            }
            if progress.possibly_truncated {
                summary.possibly_truncated += 1;
            }
        }

        summary.pending = planned_total.saturating_sub(summary.in_progress + summary.complete);
        summary
    }

    fn ensure_not_other_active(&self, unit_id: &str) -> Result<(), SweepError> {
        match &self.in_progress {
            Some(active) if active != unit_id => Err(SweepError::UnitAlreadyActive {
                active: active.clone(),
                requested: unit_id.to_string(),
            }),
            _ => Ok(()),
        }
    }
}
