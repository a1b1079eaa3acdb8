//! Fixed-window rate limiting.
//!
//! Buckets are process-local. With several instances each one counts on its
//! own, so the effective limit is approximate across a fleet.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::ApiError;

/// Result of one [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateStats {
    /// Whether the request is allowed.
    pub ok: bool,
    /// Window limit.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Whole seconds until the window resets, set on denial.
    pub retry_after: Option<u64>,
    /// When the current window ends.
    pub reset_at: Instant,
}

impl RateStats {
    /// `Ok` when allowed, otherwise the 429 error.
    pub fn into_result(self) -> Result<Self, ApiError> {
        if self.ok {
            Ok(self)
        } else {
            Err(ApiError::RateLimited {
                limit: self.limit,
                remaining: self.remaining,
                retry_after: self.retry_after.unwrap_or(1),
            })
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window counters keyed by arbitrary strings such as `mut:ip:<ip>`.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    /// Create an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request against `key`.
    ///
    /// The window starts lazily on first use and restarts once `reset_at`
    /// has passed. The `limit + 1`th request within a live window is denied.
    pub fn check(&self, key: &str, limit: u32, window: Duration) -> RateStats {
        let now = Instant::now();
        let mut bucket = self.buckets.entry(key.to_string()).or_insert(Bucket {
            count: 0,
            reset_at: now + window,
        });
        if bucket.reset_at <= now {
            *bucket = Bucket {
                count: 0,
                reset_at: now + window,
            };
        }

        if bucket.count >= limit {
            let wait = bucket.reset_at.saturating_duration_since(now);
            let retry_after = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            return RateStats {
                ok: false,
                limit,
                remaining: 0,
                retry_after: Some(retry_after.max(1)),
                reset_at: bucket.reset_at,
            };
        }

        bucket.count += 1;
        RateStats {
            ok: true,
            limit,
            remaining: limit.saturating_sub(bucket.count),
            retry_after: None,
            reset_at: bucket.reset_at,
        }
    }

    /// Drop buckets whose window has ended. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, b| b.reset_at > now);
        before - self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn exactly_limit_requests_pass_per_window() {
        let rl = RateLimiter::new();
        for i in 0..3 {
            let stats = rl.check("mut:ip:1.2.3.4", 3, WINDOW);
            assert!(stats.ok);
            assert_eq!(stats.remaining, 2 - i);
        }

        let denied = rl.check("mut:ip:1.2.3.4", 3, WINDOW);
        assert!(!denied.ok);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.retry_after, Some(60));

        tokio::time::advance(Duration::from_secs(45)).await;
        let still = rl.check("mut:ip:1.2.3.4", 3, WINDOW);
        assert_eq!(still.retry_after, Some(15));
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_reset_at() {
        let rl = RateLimiter::new();
        for _ in 0..2 {
            assert!(rl.check("k", 2, WINDOW).ok);
        }
        assert!(!rl.check("k", 2, WINDOW).ok);

        tokio::time::advance(WINDOW).await;
        for _ in 0..2 {
            assert!(rl.check("k", 2, WINDOW).ok);
        }
        assert!(!rl.check("k", 2, WINDOW).ok);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let rl = RateLimiter::new();
        assert!(rl.check("mut:user:a", 1, WINDOW).ok);
        assert!(!rl.check("mut:user:a", 1, WINDOW).ok);
        assert!(rl.check("mut:user:b", 1, WINDOW).ok);
        assert!(rl.check("mut:ip:a", 1, WINDOW).ok);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_finished_windows() {
        let rl = RateLimiter::new();
        rl.check("old", 1, Duration::from_secs(1));
        rl.check("new", 1, WINDOW);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(rl.purge_expired(), 1);
    }

    #[test]
    fn denial_converts_to_429_error() {
        let rl = RateLimiter::new();
        rl.check("k", 0, WINDOW);
        let err = rl.check("k", 0, WINDOW).into_result().unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { limit: 0, retry_after: 60, .. }));
    }
}
