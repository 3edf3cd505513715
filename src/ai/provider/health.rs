//! Provider health registry
//!
//! Narrow accessor over the process-wide per-provider records: one circuit
//! breaker and one rate window per provider name. Everything that reads or
//! mutates provider health goes through here, so the backing store can change
//! without touching the router.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::ai::rate_limiter::{RateDecision, RateLimit, RateLimiter};
use crate::config::Config;

/// Point-in-time view of one provider's health
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealthSnapshot {
    pub provider: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub blocked_count: u64,
    pub window_used: u32,
    pub window_limit: u32,
}

pub struct ProviderHealth {
    breaker_config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    limiter: RateLimiter,
}

pub type SharedHealth = Arc<ProviderHealth>;

impl ProviderHealth {
    pub fn new(breaker_config: CircuitBreakerConfig, default_limit: RateLimit) -> Self {
        Self {
            breaker_config,
            breakers: DashMap::new(),
            limiter: RateLimiter::new(default_limit),
        }
    }

    /// Build from configuration, applying per-provider rate overrides
    pub fn from_config(config: &Config) -> Self {
        let health = Self::new(
            CircuitBreakerConfig::from(&config.circuit_breaker),
            RateLimit::from(&config.rate_limit),
        );
        for provider in &config.providers {
            if let Some(limit) = &provider.rate_limit {
                health.limiter.configure(&provider.name, RateLimit::from(limit));
            }
        }
        health
    }

    pub fn shared(self) -> SharedHealth {
        Arc::new(self)
    }

    /// The provider's breaker, created closed on first use
    pub fn breaker(&self, provider: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(provider, self.breaker_config)))
            .clone()
    }

    pub fn is_open(&self, provider: &str) -> bool {
        self.breaker(provider).is_open()
    }

    pub fn check_rate(&self, provider: &str) -> RateDecision {
        self.limiter.check_rate(provider)
    }

    /// Operator reset of both the breaker and the rate window
    pub fn reset(&self, provider: &str) {
        self.breaker(provider).reset();
        self.limiter.reset(provider);
    }

    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
        self.limiter.reset_all();
    }

    /// Snapshot of every provider seen so far, sorted by name
    pub fn snapshot(&self) -> Vec<ProviderHealthSnapshot> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();

        names
            .into_iter()
            .map(|name| {
                let stats = self.breaker(&name).stats();
                let usage = self.limiter.usage(&name);
                ProviderHealthSnapshot {
                    provider: name,
                    state: stats.state,
                    consecutive_failures: stats.consecutive_failures,
                    blocked_count: stats.blocked_count,
                    window_used: usage.used,
                    window_limit: usage.limit,
                }
            })
            .collect()
    }
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default(), RateLimit::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use std::time::Duration;

    #[test]
    fn test_breaker_is_shared_per_provider() {
        let health = ProviderHealth::default();
        let a = health.breaker("openai");
        let b = health.breaker("openai");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &health.breaker("anthropic")));
    }

    #[test]
    fn test_from_config_applies_overrides() {
        let mut config = Config::default();
        config.circuit_breaker.failure_threshold = 1;
        config.providers[1].rate_limit = Some(RateLimitConfig {
            window_secs: 60,
            max_requests: 1,
        });
        let health = ProviderHealth::from_config(&config);

        assert!(health.check_rate("anthropic").is_allowed());
        assert!(!health.check_rate("anthropic").is_allowed());
        assert!(health.check_rate("openai").is_allowed());

        health.breaker("openai").record_failure();
        assert!(health.is_open("openai"));
    }

    #[test]
    fn test_reset_clears_breaker_and_window() {
        let health = ProviderHealth::new(
            CircuitBreakerConfig {
                failure_threshold: 1,
                cool_down: Duration::from_secs(60),
            },
            RateLimit {
                limit: 1,
                window: Duration::from_secs(60),
            },
        );
        health.breaker("p").record_failure();
        assert!(health.check_rate("p").is_allowed());

        health.reset("p");
        assert!(!health.is_open("p"));
        assert!(health.check_rate("p").is_allowed());
    }

    #[test]
    fn test_snapshot() {
        let health = ProviderHealth::default();
        health.breaker("b");
        health.breaker("a").record_failure();
        let _ = health.check_rate("a");

        let snapshot = health.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].provider, "a");
        assert_eq!(snapshot[0].consecutive_failures, 1);
        assert_eq!(snapshot[0].window_used, 1);
        assert_eq!(snapshot[1].state, CircuitState::Closed);
    }
}
