//! Discovery Driver: one results page per call, with rate limiting, retries
//! and session re-acquisition around the browse capability.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::browser::{BrowseError, Browser, PageRequest, RawListing};
use super::pagination::{PageEnd, Pagination};
use super::rate_limit::HostRateLimiter;
use crate::domain::{JobListing, SearchQuery};
use crate::error::{Result, ScoutError};
use crate::planner::canonicalize_job_url;

/// Retry behaviour for transient browse failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based): base * 2^(retry-1), capped.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1).min(16));
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Result of one discovery step.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryPage {
    pub listings: Vec<JobListing>,
    /// Set when this page was the query's last.
    pub end: Option<PageEnd>,
    /// Attempts used for this page, including the successful one.
    pub attempts: u32,
}

/// Drives one query page at a time against a browser.
pub struct DiscoveryDriver {
    browser: Arc<dyn Browser>,
    limiter: Arc<HostRateLimiter>,
    retry: RetryPolicy,
}

impl DiscoveryDriver {
    pub fn new(browser: Arc<dyn Browser>, limiter: Arc<HostRateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            browser,
            limiter,
            retry,
        }
    }

    /// Fetch the page `pagination` points at and advance it.
    ///
    /// Transient failures are retried with backoff and a fresh session;
    /// anything else, or running out of attempts, is a `Discovery` error.
    /// Pagination only moves on success.
    pub async fn discover(
        &self,
        query: &SearchQuery,
        pagination: &mut Pagination,
        cancel: &CancellationToken,
    ) -> Result<DiscoveryPage> {
        if pagination.is_finished() {
            return Err(ScoutError::InvalidState(format!(
                "query {} has no pages left to fetch",
                query.id
            )));
        }

        let host = self.browser.host().to_string();
        let request = PageRequest {
            query_id: query.id.clone(),
            query_text: query.text.clone(),
            params: query.params.clone(),
            cursor: pagination.cursor.clone(),
        };

        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error: Option<BrowseError> = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let wait = self.retry.backoff_for(attempt - 1);
                log::debug!("Retrying query '{}' (attempt {}) after {:?}", query.text, attempt, wait);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ScoutError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
                let reset = tokio::select! {
                    _ = cancel.cancelled() => return Err(ScoutError::Cancelled),
                    r = self.browser.reset_session() => r,
                };
                if let Err(e) = reset {
                    log::warn!("Session re-acquisition failed for {}: {}", host, e);
                    last_error = Some(e);
                    continue;
                }
            }

            self.limiter.acquire(&host, cancel).await?;

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(ScoutError::Cancelled),
                r = self.browser.fetch(&request) => r,
            };

            match outcome {
                Ok(page) => {
                    self.limiter.record_success(&host).await;
                    let end = pagination.advance(page.next_cursor);
                    let listings: Vec<JobListing> = page
                        .listings
                        .into_iter()
                        .filter_map(|raw| to_listing(raw, &query.id))
                        .collect();
                    log::info!(
                        "Query '{}' page {}: {} listings{}",
                        query.text,
                        pagination.pages_fetched,
                        listings.len(),
                        end.map(|e| format!(" (end: {:?})", e)).unwrap_or_default()
                    );
                    return Ok(DiscoveryPage {
                        listings,
                        end,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    if let BrowseError::RateLimited { retry_after } = &e {
                        self.limiter
                            .record_rate_limit(&host, retry_after.unwrap_or(Duration::ZERO))
                            .await;
                    }
                    tracing::warn!(
                        query = %query.text,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        transient = e.is_transient(),
                        error = %e,
                        "Browse request failed"
                    );
                    if !e.is_transient() {
                        return Err(ScoutError::Discovery {
                            query: query.text.clone(),
                            cause: e.to_string(),
                        });
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(ScoutError::Discovery {
            query: query.text.clone(),
            cause: format!(
                "gave up after {} attempts: {}",
                max_attempts,
                last_error.map(|e| e.to_string()).unwrap_or_default()
            ),
        })
    }
}

/// Canonicalise a raw listing. Entries without a title are dropped.
fn to_listing(raw: RawListing, query_id: &str) -> Option<JobListing> {
    let title = raw.title.trim().to_string();
    if title.is_empty() {
        log::debug!("Dropping untitled listing from query {}", query_id);
        return None;
    }
    Some(JobListing {
        external_id: raw.external_id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        title,
        company: raw.company.trim().to_string(),
        description: raw.description.trim().to_string(),
        location: raw.location.trim().to_string(),
        url: raw.url.map(|u| canonicalize_job_url(&u)).filter(|u| !u.is_empty()),
        date_posted: raw.date_posted.as_deref().and_then(parse_posted_date),
        discovered_at: Utc::now(),
        source_query: query_id.to_string(),
    })
}

/// Accepts `2024-05-01` or an RFC 3339 timestamp.
fn parse_posted_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}
