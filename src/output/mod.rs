//! Output module for reporting on and exporting sweep results
//!
//! This module handles:
//! - Displaying sweep statistics from the ledger and result store
//! - Exporting stored records as JSON Lines

mod export;
pub mod stats;

pub use export::{export_jsonl, write_jsonl};
pub use stats::{load_statistics, print_statistics, SweepStatistics};
