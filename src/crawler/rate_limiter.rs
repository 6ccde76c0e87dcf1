//! Request budget for a shared, rate-limited API
//!
//! The limiter counts every request actually sent (probes and retries
//! included) against a per-window budget. An explicit rate-limit response
//! from the API is a hard stop for the rest of the process run: the remote
//! limiter is authoritative and the sweep exits rather than waits.

use crate::config::RateLimitConfig;
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Persisted window state, so restarts inside a window keep counting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterWindow {
    pub started_at: DateTime<Utc>,
    pub consumed: u32,
}

/// Why the limiter refused further requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The local budget for the current window is spent
    BudgetExhausted { consumed: u32, budget: u32 },

    /// The API answered with a rate-limit response
    RemoteSignal(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BudgetExhausted { consumed, budget } => {
                write!(f, "request budget spent ({}/{})", consumed, budget)
            }
            Self::RemoteSignal(detail) => write!(f, "API rate limit reached: {}", detail),
        }
    }
}

/// Tracks consumed requests against the configured budget
#[derive(Debug, Clone)]
pub struct RateLimiter {
    budget: u32,
    window: Duration,
    window_started_at: DateTime<Utc>,
    consumed: u32,
    hard_stop: Option<String>,
}

impl RateLimiter {
    /// Creates a limiter with a fresh window starting now
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::from_window(config, None)
    }

    /// Creates a limiter continuing a persisted window
    ///
    /// A window older than `window-secs` is discarded on the next check.
    pub fn from_window(config: &RateLimitConfig, window: Option<LimiterWindow>) -> Self {
        let (window_started_at, consumed) = match window {
            Some(w) => (w.started_at, w.consumed),
            None => (Utc::now(), 0),
        };

        Self {
            budget: config.requests_per_window,
            window: Duration::seconds(config.window_secs as i64),
            window_started_at,
            consumed,
            hard_stop: None,
        }
    }

    /// Checks if another request may be sent now
    pub fn may_proceed(&mut self) -> bool {
        self.may_proceed_at(Utc::now())
    }

    /// Checks if another request may be sent at `now`
    ///
    /// # Returns
    ///
    /// * `true` - The budget has room and no rate-limit response was seen
    /// * `false` - Stop issuing requests; see [`RateLimiter::stop_reason`]
    pub fn may_proceed_at(&mut self, now: DateTime<Utc>) -> bool {
        if self.hard_stop.is_some() {
            return false;
        }

        self.roll_window(now);
        self.consumed < self.budget
    }

    /// Records that a request was sent
    pub fn record_request(&mut self) {
        self.record_request_at(Utc::now());
    }

    pub fn record_request_at(&mut self, now: DateTime<Utc>) {
        self.roll_window(now);
        self.consumed = self.consumed.saturating_add(1);
    }

    /// Marks the API as rate limited for the rest of this run
    pub fn observe_rate_limit(&mut self, detail: impl Into<String>) {
        self.hard_stop = Some(detail.into());
    }

    /// Why requests are refused, or `None` if they are not
    pub fn stop_reason(&self) -> Option<StopReason> {
        if let Some(detail) = &self.hard_stop {
            return Some(StopReason::RemoteSignal(detail.clone()));
        }

        if self.consumed >= self.budget {
            return Some(StopReason::BudgetExhausted {
                consumed: self.consumed,
                budget: self.budget,
            });
        }

        None
    }

    /// Requests left in the current window
    pub fn remaining(&self) -> u32 {
        self.budget.saturating_sub(self.consumed)
    }

    /// Current window state, for persisting
    pub fn window(&self) -> LimiterWindow {
        LimiterWindow {
            started_at: self.window_started_at,
            consumed: self.consumed,
        }
    }

    fn roll_window(&mut self, now: DateTime<Utc>) {
        if now - self.window_started_at >= self.window {
            if self.consumed > 0 {
                tracing::info!(
                    "Rate limit window expired; resetting {} consumed requests",
                    self.consumed
                );
            }
            self.window_started_at = now;
            self.consumed = 0;
        }
    }
}
