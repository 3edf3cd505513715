//! Command Intelligence Layer
//!
//! Everything between a text command and a validated list of tool calls:
//! classification, provider routing with health tracking, and structural
//! validation of what the provider returns.

pub mod classifier;
pub mod metrics;
pub mod provider;
pub mod rate_limiter;
pub mod timeout;
pub mod validation;

pub use classifier::{ClassificationReason, ClassificationReport, CommandClassifier};
pub use metrics::{
    CommandEvent, MetricsCollector, MetricsSummary, SharedMetrics, TELEMETRY_TARGET,
    TelemetrySink, create_shared_metrics,
};
pub use provider::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, ProviderClient, ProviderHealth,
    ProviderRouter, RouteOutcome, SharedHealth, SharedProvider, create_provider,
};
pub use rate_limiter::{RateDecision, RateLimit, RateLimiter};
pub use timeout::{TimeoutConfig, with_provider_timeout, with_timeout};
pub use validation::ToolCallValidator;
