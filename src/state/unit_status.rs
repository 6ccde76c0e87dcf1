/// Unit status definitions for tracking crawl progress
///
/// A search unit moves forward only: pending, then in progress, then complete.
use std::fmt;

/// Represents the current status of a search unit in the crawl ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitStatus {
    /// Planned but no page fetched yet
    Pending,

    /// At least one page fetched, or a fetch is underway
    InProgress,

    /// Every reachable page has been fetched, or the unit was aborted
    Complete,
}

impl UnitStatus {
    /// Returns true if no further fetching is needed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Returns true if moving from this status to `next` keeps the ledger
    /// moving forward
    ///
    /// Re-entering `InProgress` is allowed: that is how a unit interrupted by
    /// a crash or a rate-limit stop is resumed.
    pub fn can_transition_to(&self, next: UnitStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Pending)
                | (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::InProgress)
                | (Self::InProgress, Self::Complete)
        )
    }

    /// Converts the status to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
        }
    }

    /// Parses a status from a database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
