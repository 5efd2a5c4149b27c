//! Sliding-window admission control with temporary blocking.
//!
//! Each identifier (a client address, optionally prefixed by endpoint) owns a
//! window of request timestamps. Reaching the window's maximum places the
//! identifier under a block; while blocked every request is denied without
//! being recorded. Entries that have been idle long enough are swept out so
//! the map does not grow without bound.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::{RateLimitConfig, RateRule};

/// Sweep idle identifiers after this many checks.
const SWEEP_EVERY: u64 = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied {
        reason: String,
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

#[derive(Debug, Default)]
struct RateWindow {
    timestamps: VecDeque<DateTime<Utc>>,
    blocked_until: Option<DateTime<Utc>>,
}

impl RateWindow {
    fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.timestamps.back().copied()
    }
}

#[derive(Debug, Default)]
struct Inner {
    windows: HashMap<String, RateWindow>,
    checks: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    block: ChronoDuration,
    idle_eviction: ChronoDuration,
    inner: Mutex<Inner>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            block: ChronoDuration::minutes(config.block_minutes),
            idle_eviction: ChronoDuration::minutes(config.idle_eviction_minutes),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn check(&self, identifier: &str, rule: RateRule) -> Decision {
        self.check_limit(identifier, rule.max_requests, rule.window_minutes)
    }

    pub fn check_limit(&self, identifier: &str, max_requests: usize, window_minutes: i64) -> Decision {
        self.check_limit_at(identifier, max_requests, window_minutes, Utc::now())
    }

    /// [`check_limit`](Self::check_limit) against an explicit clock.
    pub fn check_limit_at(
        &self,
        identifier: &str,
        max_requests: usize,
        window_minutes: i64,
        now: DateTime<Utc>,
    ) -> Decision {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        inner.checks += 1;
        if inner.checks % SWEEP_EVERY == 0 {
            let cutoff = now - self.idle_eviction;
            let before = inner.windows.len();
            inner.windows.retain(|_, w| {
                w.blocked_until.is_some_and(|until| until > now)
                    || w.last_seen().is_some_and(|seen| seen > cutoff)
            });
            let evicted = before - inner.windows.len();
            if evicted > 0 {
                tracing::debug!(evicted, "swept idle rate-limit entries");
            }
        }

        let window = inner.windows.entry(identifier.to_string()).or_default();

        if let Some(until) = window.blocked_until {
            if now < until {
                return Decision::Denied {
                    reason: format!("Blocked until {}", until.format("%H:%M:%S")),
                    retry_after: to_std(until - now),
                };
            }
            window.blocked_until = None;
        }

        let window_start = now - ChronoDuration::minutes(window_minutes);
        while window.timestamps.front().is_some_and(|t| *t <= window_start) {
            window.timestamps.pop_front();
        }

        if window.timestamps.len() >= max_requests {
            window.blocked_until = Some(now + self.block);
            tracing::warn!(identifier, max_requests, window_minutes, "rate limit exceeded");
            return Decision::Denied {
                reason: format!(
                    "Rate limit exceeded: {} requests per {} minute(s)",
                    max_requests, window_minutes
                ),
                retry_after: to_std(self.block),
            };
        }

        window.timestamps.push_back(now);
        Decision::Allowed
    }

    /// Identifiers currently tracked.
    pub fn tracked(&self) -> usize {
        match self.inner.lock() {
            Ok(guard) => guard.windows.len(),
            Err(poisoned) => poisoned.into_inner().windows.len(),
        }
    }
}

fn to_std(d: ChronoDuration) -> Duration {
    d.to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn limiter() -> RateLimiter {
        RateLimiter::new(&RateLimitConfig::default())
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn allows_up_to_max_then_blocks() {
        let rl = limiter();
        let now = t0();
        for _ in 0..3 {
            assert!(rl.check_limit_at("1.2.3.4", 3, 1, now).is_allowed());
        }
        match rl.check_limit_at("1.2.3.4", 3, 1, now) {
            Decision::Denied { reason, retry_after } => {
                assert_eq!(reason, "Rate limit exceeded: 3 requests per 1 minute(s)");
                assert_eq!(retry_after, Duration::from_secs(300));
            }
            Decision::Allowed => panic!("fourth request should be denied"),
        }
    }

    #[test]
    fn blocked_identifier_is_denied_even_after_window_passes() {
        let rl = limiter();
        let now = t0();
        for _ in 0..3 {
            rl.check_limit_at("ip", 3, 1, now);
        }
        assert!(!rl.check_limit_at("ip", 3, 1, now).is_allowed());

        let later = now + ChronoDuration::minutes(2);
        match rl.check_limit_at("ip", 3, 1, later) {
            Decision::Denied { reason, .. } => assert_eq!(reason, "Blocked until 12:05:00"),
            Decision::Allowed => panic!("should still be blocked"),
        }
    }

    #[test]
    fn block_expires_and_window_restarts() {
        let rl = limiter();
        let now = t0();
        for _ in 0..4 {
            rl.check_limit_at("ip", 3, 1, now);
        }
        let after_block = now + ChronoDuration::minutes(6);
        assert!(rl.check_limit_at("ip", 3, 1, after_block).is_allowed());
    }

    #[test]
    fn old_timestamps_slide_out_of_window() {
        let rl = limiter();
        let now = t0();
        rl.check_limit_at("ip", 2, 1, now);
        rl.check_limit_at("ip", 2, 1, now + ChronoDuration::seconds(30));
        let later = now + ChronoDuration::seconds(61);
        assert!(rl.check_limit_at("ip", 2, 1, later).is_allowed());
    }

    #[test]
    fn identifiers_are_independent() {
        let rl = limiter();
        let now = t0();
        rl.check_limit_at("a", 1, 1, now);
        assert!(!rl.check_limit_at("a", 1, 1, now).is_allowed());
        assert!(rl.check_limit_at("b", 1, 1, now).is_allowed());
    }

    #[test]
    fn idle_identifiers_are_swept() {
        let rl = limiter();
        let now = t0();
        rl.check_limit_at("stale", 20, 1, now);
        let later = now + ChronoDuration::hours(2);
        for i in 0..SWEEP_EVERY {
            rl.check_limit_at(&format!("fresh-{}", i % 4), 1000, 1, later);
        }
        assert_eq!(rl.tracked(), 4);
    }
}
