//! Page fetcher: one page of one search unit, within the request budget
//!
//! This module handles:
//! - Consulting the rate limiter before every request (retries included)
//! - Saving the limiter window before each request leaves the process
//! - Retrying transient failures with bounded exponential backoff
//! - Turning a hard rate-limit response into a stop
//! - Computing the next cursor from the page and the reported total
//! - Answering planner probes with a one-item request

use crate::config::{Config, RetryConfig};
use crate::crawler::{FetchError, RateLimiter, SearchClient, StopReason};
use crate::planner::{Probe, ResultCounter, SearchUnit};
use crate::state::{advance, PageAdvance, PageCursor};
use crate::storage::{BusinessRecord, LedgerStore, StorageError, StorageResult};
use async_trait::async_trait;
use std::time::Duration;

/// Result of fetching one page
#[derive(Debug)]
pub enum FetchOutcome {
    /// The page arrived
    Page {
        records: Vec<BusinessRecord>,
        /// Total results the API reported
        total: u64,
        advance: PageAdvance,
    },

    /// No request may be sent; the run must stop
    Stopped(StopReason),

    /// The unit cannot be fetched any further
    Aborted { reason: String },
}

/// Fetches pages through a [`SearchClient`] under a [`RateLimiter`]
pub struct PageFetcher<C: SearchClient> {
    client: C,
    limiter: RateLimiter,
    retry: RetryConfig,
    page_size: u32,
    ceiling: u32,
    requests_issued: u64,
}

impl<C: SearchClient> PageFetcher<C> {
    pub fn new(client: C, limiter: RateLimiter, config: &Config) -> Self {
        Self {
            client,
            limiter,
            retry: config.retry.clone(),
            page_size: config.api.page_size,
            ceiling: config.api.max_results,
            requests_issued: 0,
        }
    }

    /// Fetches the page at `cursor`
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Limiter refuses | Stopped, nothing sent |
    /// | Rate-limit response | Stopped, limiter hard-stops |
    /// | Transient failure | Retry with backoff until `max-attempts`, then Aborted |
    /// | Fatal failure | Aborted |
    ///
    /// Each request is counted in the limiter window and the window saved to
    /// `ledger` before the request is sent, so a process killed mid-request
    /// still accounts for it on restart.
    ///
    /// # Errors
    ///
    /// Returns an error only if the window cannot be saved; nothing is sent.
    pub async fn fetch<L>(
        &mut self,
        ledger: &mut L,
        unit: &SearchUnit,
        cursor: &PageCursor,
    ) -> StorageResult<FetchOutcome>
    where
        L: LedgerStore + Send + ?Sized,
    {
        let mut attempt = 0;

        loop {
            if !self.limiter.may_proceed() {
                return Ok(FetchOutcome::Stopped(self.current_stop()));
            }

            self.limiter.record_request();
            ledger.save_limiter_window(&self.limiter.window())?;
            self.requests_issued += 1;
            attempt += 1;

            tracing::debug!(
                "Requesting {} offset {} limit {} (attempt {})",
                unit,
                cursor.offset,
                cursor.limit,
                attempt
            );

            match self.client.fetch_page(unit, cursor).await {
                Ok(page) => {
                    // Offsets count every item the API returned, kept or not
                    let advance = advance(cursor, page.raw_count, page.total, self.page_size, self.ceiling);
                    return Ok(FetchOutcome::Page {
                        records: page.businesses,
                        total: page.total,
                        advance,
                    });
                }
                Err(FetchError::RateLimited(detail)) => {
                    tracing::warn!(
                        "Rate limited at {} offset {}: {}",
                        unit,
                        cursor.offset,
                        detail
                    );
                    self.limiter.observe_rate_limit(detail);
                    return Ok(FetchOutcome::Stopped(self.current_stop()));
                }
                Err(FetchError::Transient(detail)) if attempt < self.retry.max_attempts => {
                    let delay = self.backoff_delay(attempt);
                    tracing::warn!(
                        "Transient failure at {} offset {}: {}; retrying in {:?}",
                        unit,
                        cursor.offset,
                        detail,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(FetchError::Transient(detail)) => {
                    return Ok(FetchOutcome::Aborted {
                        reason: format!("gave up after {} attempts: {}", attempt, detail),
                    });
                }
                Err(e @ FetchError::Fatal { .. }) => {
                    return Ok(FetchOutcome::Aborted {
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped
    fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let millis = self
            .retry
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.retry.max_delay_ms);
        Duration::from_millis(millis)
    }

    fn current_stop(&self) -> StopReason {
        self.limiter.stop_reason().unwrap_or_else(|| {
            let consumed = self.limiter.window().consumed;
            StopReason::BudgetExhausted {
                consumed,
                budget: consumed + self.limiter.remaining(),
            }
        })
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Requests sent by this fetcher, retries and probes included
    pub fn requests_issued(&self) -> u64 {
        self.requests_issued
    }

    /// Pairs this fetcher with the ledger its limiter window is saved to,
    /// for use as the planner's [`ResultCounter`]
    pub fn counter<'a, L>(&'a mut self, ledger: &'a mut L) -> LedgerCounter<'a, C, L>
    where
        L: LedgerStore + Send + ?Sized,
    {
        LedgerCounter {
            fetcher: self,
            ledger,
        }
    }
}

/// A [`PageFetcher`] answering planner probes, saving its window to a ledger
pub struct LedgerCounter<'a, C: SearchClient, L: ?Sized> {
    fetcher: &'a mut PageFetcher<C>,
    ledger: &'a mut L,
}

#[async_trait]
impl<'a, C, L> ResultCounter for LedgerCounter<'a, C, L>
where
    C: SearchClient,
    L: LedgerStore + Send + ?Sized,
{
    type Error = StorageError;

    /// Asks for a single item to learn the reported total
    async fn probe(&mut self, unit: &SearchUnit) -> StorageResult<Probe> {
        let cursor = PageCursor {
            offset: 0,
            limit: 1,
        };

        let probe = match self.fetcher.fetch(&mut *self.ledger, unit, &cursor).await? {
            FetchOutcome::Page { total, .. } => Probe::Count(total),
            FetchOutcome::Stopped(reason) => Probe::Stopped(reason),
            FetchOutcome::Aborted { reason } => Probe::Unknown(reason),
        };
        Ok(probe)
    }
}
