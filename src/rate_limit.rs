use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::clock::Clock;
use crate::config::RateLimitSettings;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Length of one quota period.
    pub window: Duration,
    /// Requests accepted per subject per period.
    pub max_requests: u32,
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            window: Duration::from_secs(settings.window_secs),
            max_requests: settings.max_requests,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    request_count: u32,
    window_reset_at: DateTime<Utc>,
}

/// Fixed-window request quota keyed by user id.
///
/// State lives in memory only, so quotas reset when the process restarts.
pub struct RateLimiter {
    entries: Mutex<HashMap<i64, RateLimitEntry>>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
            clock,
        }
    }

    fn window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.window).unwrap_or_else(|_| chrono::Duration::weeks(52))
    }

    /// Counts one request for `subject_id` if quota remains.
    ///
    /// A rejected request leaves the entry untouched, so the window keeps its
    /// original boundary.
    pub async fn check(&self, subject_id: i64) -> RateLimitDecision {
        let now = self.clock.now();
        let max = self.config.max_requests;
        let mut entries = self.entries.lock().await;

        match entries.get_mut(&subject_id) {
            Some(entry) if now <= entry.window_reset_at => {
                if entry.request_count >= max {
                    return RateLimitDecision {
                        allowed: false,
                        remaining: 0,
                        reset_at: entry.window_reset_at,
                    };
                }
                entry.request_count += 1;
                RateLimitDecision {
                    allowed: true,
                    remaining: max - entry.request_count,
                    reset_at: entry.window_reset_at,
                }
            }
            _ => {
                let window_reset_at = now + self.window();
                entries.insert(
                    subject_id,
                    RateLimitEntry {
                        request_count: 1,
                        window_reset_at,
                    },
                );
                RateLimitDecision {
                    allowed: true,
                    remaining: max.saturating_sub(1),
                    reset_at: window_reset_at,
                }
            }
        }
    }

    /// Drops entries whose window has passed. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| now <= entry.window_reset_at);
        before - entries.len()
    }

    #[cfg(test)]
    pub async fn tracked_subjects(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Runs `sweep` once per window until `shutdown` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.config.window);
            // First tick completes immediately.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = limiter.sweep().await;
                        if removed > 0 {
                            debug!(removed, "swept expired rate limit entries");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use chrono::TimeZone;

    fn limiter(max_requests: u32) -> (Arc<RateLimiter>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap(),
        ));
        let limiter = RateLimiter::new(
            RateLimitConfig {
                window: Duration::from_secs(3600),
                max_requests,
            },
            clock.clone(),
        );
        (Arc::new(limiter), clock)
    }

    #[tokio::test]
    async fn eleventh_request_in_window_is_rejected_at_first_boundary() {
        let (limiter, clock) = limiter(10);

        let first = limiter.check(42).await;
        assert!(first.allowed);
        assert_eq!(first.remaining, 9);

        for expected_remaining in (0..9).rev() {
            clock.advance(chrono::Duration::minutes(1));
            let decision = limiter.check(42).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
            assert_eq!(decision.reset_at, first.reset_at);
        }

        let eleventh = limiter.check(42).await;
        assert!(!eleventh.allowed);
        assert_eq!(eleventh.remaining, 0);
        assert_eq!(eleventh.reset_at, first.reset_at);

        clock.advance(chrono::Duration::minutes(5));
        let twelfth = limiter.check(42).await;
        assert!(!twelfth.allowed);
        assert_eq!(twelfth.reset_at, eleventh.reset_at);
    }

    #[tokio::test]
    async fn quota_recovers_after_boundary() {
        let (limiter, clock) = limiter(2);
        let first = limiter.check(1).await;
        limiter.check(1).await;
        assert!(!limiter.check(1).await.allowed);

        // Exactly at the boundary the window is still active.
        clock.advance(chrono::Duration::hours(1));
        assert!(!limiter.check(1).await.allowed);

        clock.advance(chrono::Duration::milliseconds(1));
        let fresh = limiter.check(1).await;
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 1);
        assert!(fresh.reset_at > first.reset_at);
    }

    #[tokio::test]
    async fn subjects_are_independent() {
        let (limiter, _clock) = limiter(1);
        assert!(limiter.check(1).await.allowed);
        assert!(!limiter.check(1).await.allowed);
        assert!(limiter.check(2).await.allowed);
    }

    #[tokio::test]
    async fn concurrent_checks_never_exceed_quota() {
        let (limiter, _clock) = limiter(5);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.check(9).await.allowed })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let (limiter, clock) = limiter(3);
        limiter.check(1).await;
        clock.advance(chrono::Duration::minutes(30));
        limiter.check(2).await;

        clock.advance(chrono::Duration::minutes(31));
        assert_eq!(limiter.sweep().await, 1);
        assert_eq!(limiter.tracked_subjects().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_on_window_interval() {
        let (limiter, clock) = limiter(3);
        limiter.check(1).await;
        clock.advance(chrono::Duration::hours(2));

        let shutdown = CancellationToken::new();
        let handle = limiter.spawn_sweeper(shutdown.clone());

        tokio::time::sleep(Duration::from_secs(3601)).await;
        assert_eq!(limiter.tracked_subjects().await, 0);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
