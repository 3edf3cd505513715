//! Circuit Breaker for Provider Resilience
//!
//! Per-provider failure-state machine. Halts outbound calls to a provider with
//! sustained failures until a cool-down elapses, then admits exactly one probe.
//!
//! ## Transitions
//!
//! ```text
//! Closed   --[failure_threshold consecutive failures]--> Open
//! Open     --[cool-down elapsed]-----------------------> HalfOpen
//! HalfOpen --[probe success]---------------------------> Closed
//! HalfOpen --[probe failure]---------------------------> Open (opened_at reset)
//! ```
//!
//! Every read and transition happens under one mutex, so concurrent failures
//! cannot under-count and concurrent callers cannot both claim the probe.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::CircuitBreakerSettings;
use crate::constants::circuit_breaker as cb_constants;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests flow through
    Closed,
    /// Provider is failing - requests rejected immediately
    Open,
    /// Cool-down elapsed - one probe may go out
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Duration to wait before admitting a recovery probe
    pub cool_down: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: cb_constants::FAILURE_THRESHOLD,
            cool_down: Duration::from_secs(cb_constants::COOL_DOWN_SECS),
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            cool_down: Duration::from_secs(settings.cool_down_secs),
        }
    }
}

/// Admission verdict for one outbound call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed
    Allowed,
    /// This caller holds the single half-open probe and must report back
    /// (`record_success`, `record_failure` or `release_probe`)
    Probe,
    /// Circuit open, or the probe is already out
    Rejected,
}

#[derive(Debug)]
struct CircuitBreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    blocked_count: u64,
}

impl CircuitBreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
            blocked_count: 0,
        }
    }

    fn trip(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.probe_in_flight = false;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.probe_in_flight = false;
    }
}

/// Thread-safe circuit breaker for one provider.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    provider_name: String,
    inner: Mutex<CircuitBreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for a provider
    pub fn new(provider_name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            provider_name: provider_name.into(),
            inner: Mutex::new(CircuitBreakerInner::new()),
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider_name: impl Into<String>) -> Self {
        Self::new(provider_name, CircuitBreakerConfig::default())
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CircuitBreakerInner> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.refresh(&mut inner);
        inner
    }

    /// Open -> HalfOpen once the cool-down has elapsed
    fn refresh(&self, inner: &mut CircuitBreakerInner) {
        if inner.state == CircuitState::Open
            && inner
                .opened_at
                .is_some_and(|opened| opened.elapsed() >= self.config.cool_down)
        {
            inner.state = CircuitState::HalfOpen;
            inner.probe_in_flight = false;

            tracing::info!(
                "Circuit breaker [{}]: Transitioning to HALF_OPEN (probe allowed)",
                self.provider_name
            );
        }
    }

    /// Current state (applying any due cool-down transition)
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Whether a call would be short-circuited right now
    pub fn is_open(&self) -> bool {
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => true,
            CircuitState::HalfOpen => inner.probe_in_flight,
        }
    }

    /// Decide whether one outbound call may proceed.
    ///
    /// In half-open state the first caller claims the probe; everyone else
    /// is rejected until the probe reports back.
    pub fn try_acquire(&self) -> Admission {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                tracing::debug!(
                    "Circuit breaker [{}]: Probe admitted",
                    self.provider_name
                );
                Admission::Probe
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                inner.blocked_count += 1;
                tracing::debug!(
                    "Circuit breaker [{}]: Request blocked (circuit {})",
                    self.provider_name,
                    inner.state
                );
                Admission::Rejected
            }
        }
    }

    /// Give back a claimed probe without a verdict
    pub fn release_probe(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.close();
                tracing::info!(
                    "Circuit breaker [{}]: Closed (provider recovered)",
                    self.provider_name
                );
            }
            // A straggler admitted before the circuit opened; only a probe may close it.
            CircuitState::Open => {}
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;

                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.trip();
                    tracing::warn!(
                        "Circuit breaker [{}]: Opened after {} failures (cool-down: {:?})",
                        self.provider_name,
                        inner.consecutive_failures,
                        self.config.cool_down
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.consecutive_failures += 1;
                inner.trip();
                tracing::warn!(
                    "Circuit breaker [{}]: Re-opened after failed probe",
                    self.provider_name
                );
            }
            CircuitState::Open => {}
        }
    }

    /// Force reset to closed state (operator action)
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.close();
        inner.blocked_count = 0;

        tracing::info!(
            "Circuit breaker [{}]: Manually reset to CLOSED",
            self.provider_name
        );
    }

    /// Get statistics for monitoring
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.lock();

        CircuitBreakerStats {
            provider_name: self.provider_name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            probe_in_flight: inner.probe_in_flight,
            blocked_count: inner.blocked_count,
            open_for: inner.opened_at.map(|t| t.elapsed()),
        }
    }
}

/// Statistics for monitoring circuit breaker state
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub provider_name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub probe_in_flight: bool,
    pub blocked_count: u64,
    #[serde(skip)]
    pub open_for: Option<Duration>,
}

impl CircuitBreakerStats {
    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let time_str = self
            .open_for
            .map(|d| format!(" since {:.1}s", d.as_secs_f64()))
            .unwrap_or_default();

        format!(
            "[{}] {} | failures={} blocked={}{}",
            self.provider_name, self.state, self.consecutive_failures, self.blocked_count, time_str
        )
    }
}
