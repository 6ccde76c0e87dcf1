//! Query planner
//!
//! Expands configured areas and filters into an ordered, deterministic list of
//! search units, subdividing any area whose expected result count exceeds the
//! API's pagination ceiling:
//! - named locations split into configured ZIP partitions
//! - bounding boxes split into quadrants, recursively, up to a maximum depth
//!
//! Units that cannot be split further are emitted flagged as possibly
//! truncated.

mod geo;
mod unit;

pub use geo::{BoundingBox, MAX_SEARCH_RADIUS_M};
pub use unit::{unit_id, AreaQuery, SearchUnit};

use crate::config::{AreaEntry, Config};
use crate::crawler::StopReason;
use async_trait::async_trait;
use std::collections::HashSet;

/// Answer to "how many results would this unit return?"
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    /// The API reported this many results
    Count(u64),

    /// The probe failed; the count is not known
    Unknown(String),

    /// The rate limiter refused or the API signalled a rate limit
    Stopped(StopReason),
}

/// Source of expected result counts, consulted while subdividing
///
/// An `Err` aborts planning altogether; a failed count is `Probe::Unknown`.
#[async_trait]
pub trait ResultCounter {
    type Error: Send;

    async fn probe(&mut self, unit: &SearchUnit) -> Result<Probe, Self::Error>;
}

/// Result of expanding one root
#[derive(Debug, Clone, PartialEq)]
pub enum Expansion {
    /// The root's complete, ordered unit list
    Units(Vec<SearchUnit>),

    /// Probing stopped on a rate limit before the root was fully planned
    Stopped(StopReason),
}

/// One configured area searched with one filter, before subdivision
#[derive(Debug, Clone)]
pub struct PlanRoot {
    pub unit: SearchUnit,
    pub partitions: Vec<String>,
}

/// Expands areas into search units
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    roots: Vec<PlanRoot>,
    ceiling: u64,
    max_depth: u32,
}

impl QueryPlanner {
    /// Creates a planner for every (area, filter) pair
    ///
    /// Roots are ordered area-major, then filter. Roots with identical
    /// identifiers are kept once.
    pub fn new(
        areas: &[AreaEntry],
        filters: &[Option<String>],
        ceiling: u32,
        max_depth: u32,
    ) -> Self {
        let mut roots = Vec::new();
        let mut seen = HashSet::new();

        for area in areas {
            let query = match (&area.location, &area.bbox) {
                (Some(location), _) => AreaQuery::Location(location.trim().to_string()),
                (None, Some(bbox)) => AreaQuery::Bounds(*bbox),
                (None, None) => continue,
            };

            let mut partitions = Vec::new();
            for zip in &area.partitions {
                let zip = zip.trim().to_string();
                if !partitions.contains(&zip) {
                    partitions.push(zip);
                }
            }

            for filter in filters {
                let unit = SearchUnit::new(query.clone(), filter.clone());
                if seen.insert(unit.id().to_string()) {
                    roots.push(PlanRoot {
                        unit,
                        partitions: partitions.clone(),
                    });
                }
            }
        }

        Self {
            roots,
            ceiling: ceiling as u64,
            max_depth,
        }
    }

    /// Creates a planner from the areas, filters, and limits in a config
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.areas,
            &config.effective_filters(),
            config.api.max_results,
            config.planner.max_depth,
        )
    }

    /// Roots in planning order
    pub fn roots(&self) -> &[PlanRoot] {
        &self.roots
    }

    /// Expands one root into its ordered unit list
    pub async fn expand<R>(
        &self,
        root: &PlanRoot,
        counter: &mut R,
    ) -> Result<Expansion, R::Error>
    where
        R: ResultCounter + Send + ?Sized,
    {
        match root.unit.query() {
            AreaQuery::Location(location) => {
                self.expand_location(root, location, counter).await
            }
            AreaQuery::Bounds(_) => self.expand_bounds(root, counter).await,
        }
    }

    async fn expand_location<R>(
        &self,
        root: &PlanRoot,
        location: &str,
        counter: &mut R,
    ) -> Result<Expansion, R::Error>
    where
        R: ResultCounter + Send + ?Sized,
    {
        let expected = match counter.probe(&root.unit).await? {
            Probe::Stopped(reason) => return Ok(Expansion::Stopped(reason)),
            Probe::Count(n) => n,
            Probe::Unknown(error) => {
                tracing::warn!(
                    "Could not count results for {}: {}; searching it whole",
                    root.unit,
                    error
                );
                return Ok(Expansion::Units(vec![root.unit.clone().flagged()]));
            }
        };

        tracing::info!("{} should return {} results", root.unit, expected);

        if expected <= self.ceiling {
            return Ok(Expansion::Units(vec![root.unit.clone()]));
        }

        if root.partitions.is_empty() {
            tracing::warn!(
                "{} has {} results but no ZIP partitions; at most {} are reachable",
                root.unit,
                expected,
                self.ceiling
            );
            return Ok(Expansion::Units(vec![root.unit.clone().flagged()]));
        }

        tracing::info!(
            "Searching {} by {} ZIP partitions to reach more than {} results",
            location,
            root.partitions.len(),
            self.ceiling
        );

        let units = root
            .partitions
            .iter()
            .map(|zip| {
                SearchUnit::at_depth(
                    AreaQuery::Location(format!("{} {}", location, zip)),
                    root.unit.filter().map(str::to_string),
                    1,
                )
            })
            .collect();

        Ok(Expansion::Units(units))
    }

    async fn expand_bounds<R>(
        &self,
        root: &PlanRoot,
        counter: &mut R,
    ) -> Result<Expansion, R::Error>
    where
        R: ResultCounter + Send + ?Sized,
    {
        let filter = root.unit.filter().map(str::to_string);
        let mut units = Vec::new();
        let mut stack = vec![root.unit.clone()];

        while let Some(unit) = stack.pop() {
            let AreaQuery::Bounds(bbox) = *unit.query() else {
                units.push(unit);
                continue;
            };
            let can_split = unit.depth() < self.max_depth;

            // Too wide for one radius search: split without spending a probe
            if !bbox.fits_single_search() && can_split {
                push_quadrants(&mut stack, &bbox, filter.as_ref(), unit.depth() + 1);
                continue;
            }

            match counter.probe(&unit).await? {
                Probe::Stopped(reason) => return Ok(Expansion::Stopped(reason)),
                Probe::Unknown(error) => {
                    tracing::warn!("Could not count results for {}: {}", unit, error);
                    units.push(unit.flagged());
                }
                Probe::Count(expected) if expected <= self.ceiling && bbox.fits_single_search() => {
                    tracing::debug!("{} should return {} results", unit, expected);
                    units.push(unit);
                }
                Probe::Count(expected) if can_split => {
                    tracing::debug!(
                        "{} has {} results; splitting into quadrants",
                        unit,
                        expected
                    );
                    push_quadrants(&mut stack, &bbox, filter.as_ref(), unit.depth() + 1);
                }
                Probe::Count(expected) => {
                    tracing::warn!(
                        "{} still has {} results at depth {}; some may be unreachable",
                        unit,
                        expected,
                        unit.depth()
                    );
                    units.push(unit.flagged());
                }
            }
        }

        Ok(Expansion::Units(units))
    }
}

/// Pushes quadrants so they pop in SW, SE, NW, NE order
fn push_quadrants(
    stack: &mut Vec<SearchUnit>,
    bbox: &BoundingBox,
    filter: Option<&String>,
    depth: u32,
) {
    for quadrant in bbox.quadrants().iter().rev() {
        stack.push(SearchUnit::at_depth(
            AreaQuery::Bounds(*quadrant),
            filter.cloned(),
            depth,
        ));
    }
}
