//! Per-host rate limiting shared by every run in the process.
//!
//! Each host gets a minimum spacing between requests, a token bucket for
//! bursts, and a coordinated backoff after rate-limit responses. All state
//! sits behind one async mutex; callers reserve a slot under the lock and
//! sleep outside it.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ScoutError};

/// Rate limit configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Minimum gap between two requests to the same host.
    pub min_spacing: Duration,
    /// Burst size of the token bucket.
    pub bucket_capacity: u32,
    /// Tokens added per second. Zero disables the bucket.
    pub refill_per_sec: f64,
    /// Divides `min_spacing`. Values below 1.0 are ignored so spacing can
    /// only be shortened by an explicit setting.
    pub relaxation: f64,
    /// Upper bound on a single coordinated backoff.
    pub max_backoff: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_spacing: Duration::from_secs(2),
            bucket_capacity: 5,
            refill_per_sec: 0.5,
            relaxation: 1.0,
            max_backoff: Duration::from_secs(64),
        }
    }
}

impl RateLimitConfig {
    pub fn effective_spacing(&self) -> Duration {
        if self.relaxation > 1.0 {
            self.min_spacing.div_f64(self.relaxation)
        } else {
            self.min_spacing
        }
    }
}

/// Limiter state for one host.
#[derive(Debug)]
struct HostState {
    /// Earliest start of the next request.
    next_slot: Instant,
    /// Token count as of `refill_at`.
    tokens: f64,
    refill_at: Instant,
    backoff_until: Option<Instant>,
    consecutive_hits: u32,
}

impl HostState {
    fn new(now: Instant, capacity: u32) -> Self {
        Self {
            next_slot: now,
            tokens: capacity as f64,
            refill_at: now,
            backoff_until: None,
            consecutive_hits: 0,
        }
    }
}

/// Shared per-host limiter.
#[derive(Debug)]
pub struct HostRateLimiter {
    config: RateLimitConfig,
    hosts: Mutex<HashMap<String, HostState>>,
}

impl HostRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Reserve the next request slot for `host` and return how long the
    /// caller must wait before using it.
    pub async fn reserve(&self, host: &str) -> Duration {
        let now = Instant::now();
        let mut hosts = self.hosts.lock().await;
        let state = hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(now, self.config.bucket_capacity));

        let mut start = now.max(state.next_slot);
        if let Some(until) = state.backoff_until {
            start = start.max(until);
        }

        if self.config.refill_per_sec > 0.0 {
            let capacity = self.config.bucket_capacity.max(1) as f64;
            let refilled = (start - state.refill_at).as_secs_f64() * self.config.refill_per_sec;
            let mut tokens = (state.tokens + refilled).min(capacity);
            if tokens < 1.0 {
                start += Duration::from_secs_f64((1.0 - tokens) / self.config.refill_per_sec);
                tokens = 1.0;
            }
            state.tokens = tokens - 1.0;
            state.refill_at = start;
        }

        state.next_slot = start + self.config.effective_spacing();
        start - now
    }

    /// Wait for a slot, aborting promptly on cancellation.
    pub async fn acquire(&self, host: &str, cancel: &CancellationToken) -> Result<()> {
        let wait = self.reserve(host).await;
        if wait.is_zero() {
            return Ok(());
        }
        log::debug!("Rate limiter: waiting {:?} for {}", wait, host);
        tokio::select! {
            _ = cancel.cancelled() => Err(ScoutError::Cancelled),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }

    /// Record a rate-limit response from `host`.
    ///
    /// The delay is the larger of the suggested `retry_after` and
    /// 2^consecutive_hits seconds, capped at `max_backoff`.
    pub async fn record_rate_limit(&self, host: &str, retry_after: Duration) -> Duration {
        let now = Instant::now();
        let mut hosts = self.hosts.lock().await;
        let state = hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(now, self.config.bucket_capacity));

        state.consecutive_hits += 1;
        let exp_backoff = Duration::from_secs(2u64.pow(state.consecutive_hits.min(6)));
        let delay = retry_after.max(exp_backoff).min(self.config.max_backoff);
        let until = now + delay;
        state.backoff_until = Some(state.backoff_until.map_or(until, |prev| prev.max(until)));

        tracing::warn!(
            host = host,
            retry_after_secs = delay.as_secs(),
            consecutive_hits = state.consecutive_hits,
            "Rate limited, backing off host"
        );
        delay
    }

    /// Record a successful request; resets the hit counter.
    pub async fn record_success(&self, host: &str) {
        let mut hosts = self.hosts.lock().await;
        if let Some(state) = hosts.get_mut(host) {
            state.consecutive_hits = 0;
            state.backoff_until = None;
        }
    }

    /// Remaining backoff for `host`, if any.
    pub async fn remaining_backoff(&self, host: &str) -> Option<Duration> {
        let hosts = self.hosts.lock().await;
        let until = hosts.get(host)?.backoff_until?;
        let now = Instant::now();
        if now < until { Some(until - now) } else { None }
    }

    pub async fn consecutive_hits(&self, host: &str) -> u32 {
        self.hosts.lock().await.get(host).map(|s| s.consecutive_hits).unwrap_or(0)
    }
}

impl Default for HostRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn config(spacing_secs: u64) -> RateLimitConfig {
        RateLimitConfig {
            min_spacing: Duration::from_secs(spacing_secs),
            bucket_capacity: 100,
            refill_per_sec: 100.0,
            relaxation: 1.0,
            max_backoff: Duration::from_secs(64),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_spacing_enforced() {
        let limiter = HostRateLimiter::new(config(2));
        let cancel = CancellationToken::new();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire("jobs.example.com", &cancel).await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hosts_are_independent() {
        let limiter = HostRateLimiter::new(config(10));
        assert_eq!(limiter.reserve("a.example.com").await, Duration::ZERO);
        assert_eq!(limiter.reserve("b.example.com").await, Duration::ZERO);
        assert_eq!(limiter.reserve("a.example.com").await, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_relaxation_shortens_spacing() {
        let mut cfg = config(4);
        cfg.relaxation = 2.0;
        let limiter = HostRateLimiter::new(cfg);
        limiter.reserve("h").await;
        assert_eq!(limiter.reserve("h").await, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_relaxation_below_one_is_ignored() {
        let mut cfg = config(4);
        cfg.relaxation = 0.5;
        assert_eq!(cfg.effective_spacing(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_limits_bursts() {
        let limiter = HostRateLimiter::new(RateLimitConfig {
            min_spacing: Duration::ZERO,
            bucket_capacity: 2,
            refill_per_sec: 0.5,
            relaxation: 1.0,
            max_backoff: Duration::from_secs(64),
        });
        assert_eq!(limiter.reserve("h").await, Duration::ZERO);
        assert_eq!(limiter.reserve("h").await, Duration::ZERO);
        assert_eq!(limiter.reserve("h").await, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_backoff_is_exponential_and_capped() {
        let mut cfg = config(0);
        cfg.max_backoff = Duration::from_secs(10);
        let limiter = HostRateLimiter::new(cfg);

        assert_eq!(limiter.record_rate_limit("h", Duration::ZERO).await, Duration::from_secs(2));
        assert_eq!(limiter.record_rate_limit("h", Duration::ZERO).await, Duration::from_secs(4));
        assert_eq!(limiter.record_rate_limit("h", Duration::from_secs(7)).await, Duration::from_secs(8));
        assert_eq!(limiter.record_rate_limit("h", Duration::ZERO).await, Duration::from_secs(10));
        assert_eq!(limiter.consecutive_hits("h").await, 4);
        assert!(limiter.remaining_backoff("h").await.is_some());

        limiter.record_success("h").await;
        assert_eq!(limiter.consecutive_hits("h").await, 0);
        assert!(limiter.remaining_backoff("h").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_next_acquire() {
        let limiter = HostRateLimiter::new(config(0));
        let cancel = CancellationToken::new();
        limiter.record_rate_limit("h", Duration::from_secs(5)).await;

        let start = Instant::now();
        limiter.acquire("h", &cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_is_cancellable() {
        let limiter = HostRateLimiter::new(config(60));
        let cancel = CancellationToken::new();
        limiter.acquire("h", &cancel).await.unwrap();

        cancel.cancel();
        let err = limiter.acquire("h", &cancel).await.unwrap_err();
        assert!(matches!(err, ScoutError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_limiter_spaces_concurrent_callers() {
        let limiter = Arc::new(HostRateLimiter::new(config(3)));
        let start = Instant::now();
        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire("h", &CancellationToken::new()).await.unwrap();
                    Instant::now()
                })
            })
            .collect();

        let mut times = Vec::new();
        for task in tasks {
            times.push(task.await.unwrap());
        }
        times.sort();
        assert!(times[1] - times[0] >= Duration::from_secs(3));
        assert!(times[2] - times[1] >= Duration::from_secs(3));
        assert!(start.elapsed() >= Duration::from_secs(6));
    }
}
