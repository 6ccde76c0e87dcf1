//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `UnitStatus`: Lifecycle of a search unit (pending, in progress, complete)
//! - `PageCursor`: Offset and limit of the next page to fetch
//! - `CrawlState`: The per-unit ledger, committed after every persisted page

mod cursor;
mod ledger;
mod unit_status;

// Re-export main types
pub use cursor::{advance, PageAdvance, PageCursor};
pub use ledger::{Checkpoint, CrawlState, LedgerSummary, UnitProgress};
pub use unit_status::UnitStatus;
