//! Per-provider admission control
//!
//! Fixed-window counter keyed by provider name. Each provider's window lives
//! in its own `DashMap` entry, so a check-and-count is one critical section
//! per provider and never contends across providers.
//!
//! A rejection makes no downstream call and does not consume budget.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use crate::config::RateLimitConfig;

/// Window parameters for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: u32,
    pub window: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::from(&RateLimitConfig::default())
    }
}

impl From<&RateLimitConfig> for RateLimit {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            limit: config.max_requests,
            window: Duration::from_secs(config.window_secs),
        }
    }
}

/// Outcome of a rate check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Counted against the window
    Allowed { remaining: u32 },
    /// Window exhausted; nothing was counted
    Rejected { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Debug, Clone)]
struct RateWindow {
    window_start: Instant,
    request_count: u32,
    limit: RateLimit,
}

impl RateWindow {
    fn new(limit: RateLimit, now: Instant) -> Self {
        Self {
            window_start: now,
            request_count: 0,
            limit,
        }
    }

    fn roll_if_expired(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= self.limit.window {
            self.window_start = now;
            self.request_count = 0;
        }
    }
}

/// Current window usage for one provider
#[derive(Debug, Clone, Serialize)]
pub struct RateUsage {
    pub provider: String,
    pub used: u32,
    pub limit: u32,
    pub window_secs: u64,
}

/// Fixed-window rate limiter shared by every request in the process
pub struct RateLimiter {
    default_limit: RateLimit,
    overrides: DashMap<String, RateLimit>,
    windows: DashMap<String, RateWindow>,
}

impl RateLimiter {
    pub fn new(default_limit: RateLimit) -> Self {
        Self {
            default_limit,
            overrides: DashMap::new(),
            windows: DashMap::new(),
        }
    }

    /// Use a provider-specific limit instead of the default
    pub fn configure(&self, provider: &str, limit: RateLimit) {
        self.overrides.insert(provider.to_string(), limit);
        self.windows.remove(provider);
    }

    fn limit_for(&self, provider: &str) -> RateLimit {
        self.overrides
            .get(provider)
            .map(|l| *l)
            .unwrap_or(self.default_limit)
    }

    /// Admit or reject one request for `provider`
    pub fn check_rate(&self, provider: &str) -> RateDecision {
        self.check_rate_at(provider, Instant::now())
    }

    pub(crate) fn check_rate_at(&self, provider: &str, now: Instant) -> RateDecision {
        let limit = self.limit_for(provider);
        let mut window = self
            .windows
            .entry(provider.to_string())
            .or_insert_with(|| RateWindow::new(limit, now));

        window.roll_if_expired(now);

        if window.request_count >= window.limit.limit {
            let elapsed = now.duration_since(window.window_start);
            let retry_after = window.limit.window.saturating_sub(elapsed);
            tracing::warn!(
                provider = %provider,
                limit = window.limit.limit,
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit reached"
            );
            return RateDecision::Rejected { retry_after };
        }

        window.request_count += 1;
        RateDecision::Allowed {
            remaining: window.limit.limit - window.request_count,
        }
    }

    /// Discard the provider's window (operator action)
    pub fn reset(&self, provider: &str) {
        self.windows.remove(provider);
        tracing::info!(provider = %provider, "Rate window reset");
    }

    pub fn reset_all(&self) {
        self.windows.clear();
    }

    /// Requests counted in the provider's live window
    pub fn usage(&self, provider: &str) -> RateUsage {
        let limit = self.limit_for(provider);
        let now = Instant::now();
        let used = self
            .windows
            .get(provider)
            .filter(|w| now.duration_since(w.window_start) < w.limit.window)
            .map(|w| w.request_count)
            .unwrap_or(0);

        RateUsage {
            provider: provider.to_string(),
            used,
            limit: limit.limit,
            window_secs: limit.window.as_secs(),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimit::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(limit: u32) -> RateLimiter {
        RateLimiter::new(RateLimit {
            limit,
            window: Duration::from_secs(60),
        })
    }

    #[test]
    fn test_allows_up_to_limit() {
        let rl = limiter(3);
        assert_eq!(rl.check_rate("p"), RateDecision::Allowed { remaining: 2 });
        assert_eq!(rl.check_rate("p"), RateDecision::Allowed { remaining: 1 });
        assert_eq!(rl.check_rate("p"), RateDecision::Allowed { remaining: 0 });
        assert!(!rl.check_rate("p").is_allowed());
    }

    #[test]
    fn test_rejection_is_not_counted() {
        let rl = limiter(1);
        assert!(rl.check_rate("p").is_allowed());
        for _ in 0..5 {
            assert!(!rl.check_rate("p").is_allowed());
        }
        assert_eq!(rl.usage("p").used, 1);
    }

    #[test]
    fn test_expired_window_is_replaced() {
        let rl = limiter(1);
        let start = Instant::now();
        assert!(rl.check_rate_at("p", start).is_allowed());

        match rl.check_rate_at("p", start + Duration::from_secs(20)) {
            RateDecision::Rejected { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(40));
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        assert!(
            rl.check_rate_at("p", start + Duration::from_secs(60))
                .is_allowed()
        );
    }

    #[test]
    fn test_providers_are_independent() {
        let rl = limiter(1);
        assert!(rl.check_rate("a").is_allowed());
        assert!(!rl.check_rate("a").is_allowed());
        assert!(rl.check_rate("b").is_allowed());
    }

    #[test]
    fn test_override_and_reset() {
        let rl = limiter(1);
        rl.configure(
            "big",
            RateLimit {
                limit: 3,
                window: Duration::from_secs(60),
            },
        );
        for _ in 0..3 {
            assert!(rl.check_rate("big").is_allowed());
        }
        assert!(!rl.check_rate("big").is_allowed());
        assert_eq!(rl.usage("big").limit, 3);

        rl.reset("big");
        assert!(rl.check_rate("big").is_allowed());
    }

    #[test]
    fn test_concurrent_count_never_exceeds_limit() {
        let rl = Arc::new(limiter(50));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rl = Arc::clone(&rl);
                std::thread::spawn(move || {
                    (0..20).filter(|_| rl.check_rate("p").is_allowed()).count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
        assert_eq!(rl.usage("p").used, 50);
    }
}
