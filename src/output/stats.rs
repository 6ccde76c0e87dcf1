//! Statistics generation from the sweep database
//!
//! This module provides functionality for extracting and displaying
//! sweep statistics from the storage layer.

use crate::crawler::LimiterWindow;
use crate::state::{CrawlState, LedgerSummary};
use crate::storage::{LedgerStore, ResultStore, RunRecord};
use crate::SweepError;

/// Sweep statistics summary
#[derive(Debug, Clone)]
pub struct SweepStatistics {
    /// Total number of stored business records
    pub total_records: u64,

    /// Number of distinct planned units
    pub planned_units: u64,

    /// Unit counts by status
    pub units: LedgerSummary,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,

    /// Requests consumed in the current rate limit window
    pub limiter: Option<LimiterWindow>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(SweepStatistics)` - Successfully loaded statistics
/// * `Err(SweepError)` - Failed to query statistics
pub fn load_statistics<S: ResultStore + LedgerStore>(
    storage: &S,
) -> Result<SweepStatistics, SweepError> {
    let planned_units = storage.count_planned_units()?;
    let state = CrawlState::load(storage)?;

    Ok(SweepStatistics {
        total_records: storage.count()?,
        planned_units,
        units: state.summary(planned_units),
        latest_run: storage.latest_run()?,
        limiter: storage.load_limiter_window()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &SweepStatistics) {
    println!("=== Sweep Statistics ===\n");

    println!("Overview:");
    println!("  Business records stored: {}", stats.total_records);
    println!("  Search units planned: {}", stats.planned_units);
    println!();

    println!("Units by Status:");
    println!("  complete: {}", stats.units.complete);
    println!("  in_progress: {}", stats.units.in_progress);
    println!("  pending: {}", stats.units.pending);
    if stats.units.truncated > 0 {
        println!(
            "  ({} complete units could not reach every result)",
            stats.units.truncated
        );
    }
    if stats.units.possibly_truncated > 0 {
        println!(
            "  ({} started units could not be subdivided below the result ceiling; results may be missing)",
            stats.units.possibly_truncated
        );
    }
    println!();

    if let Some(run) = &stats.latest_run {
        println!("Latest Run:");
        println!("  #{} {}", run.id, run.status.to_db_string());
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!();
    }

    if let Some(window) = &stats.limiter {
        println!(
            "Rate Limit Window: {} requests since {}",
            window.consumed,
            window.started_at.to_rfc3339()
        );
        println!();
    }

    let progress = if stats.planned_units > 0 {
        (stats.units.complete as f64 / stats.planned_units as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Progress: {:.1}% ({} / {} units complete)",
        progress, stats.units.complete, stats.planned_units
    );
}
