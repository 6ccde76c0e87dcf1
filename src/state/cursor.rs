//! Page cursors and next-page computation

use serde::{Deserialize, Serialize};

/// Position of the next page to fetch for a search unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub offset: u32,
    pub limit: u32,
}

impl PageCursor {
    /// Cursor for the first page of a unit
    pub fn first(page_size: u32, max_results: u32) -> Self {
        Self {
            offset: 0,
            limit: page_size.min(max_results),
        }
    }
}

/// What follows a fetched page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAdvance {
    /// Fetch this cursor next
    Next(PageCursor),

    /// The unit is exhausted; `truncated` means the API reported results that
    /// pagination could not reach
    Done { truncated: bool },
}

/// Computes the cursor following a page
///
/// # Arguments
///
/// * `cursor` - The cursor the page was fetched with
/// * `received` - Number of items the page contained
/// * `total` - Total result count reported by the API
/// * `page_size` - Configured page size
/// * `ceiling` - Pagination ceiling (offset + limit may not exceed it)
///
/// # Returns
///
/// The next cursor, or `Done` once every reachable result has been seen.
/// An empty page always ends the unit.
pub fn advance(
    cursor: &PageCursor,
    received: u32,
    total: u64,
    page_size: u32,
    ceiling: u32,
) -> PageAdvance {
    let reachable = total.min(ceiling as u64);

    if received == 0 {
        if (cursor.offset as u64) < reachable {
            tracing::warn!(
                "Empty page at offset {} although {} results are reachable",
                cursor.offset,
                reachable
            );
        }
        return PageAdvance::Done {
            truncated: (cursor.offset as u64) < total,
        };
    }

    let next_offset = cursor.offset as u64 + received as u64;
    if next_offset >= reachable {
        return PageAdvance::Done {
            truncated: next_offset < total,
        };
    }

    let limit = (page_size as u64).min(reachable - next_offset);
    PageAdvance::Next(PageCursor {
        offset: next_offset as u32,
        limit: limit as u32,
    })
}
