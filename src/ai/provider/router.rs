//! Provider Router
//!
//! Two-step, non-recursive pipeline: primary, then (at most) one distinct
//! fallback. At most two outbound calls per command.
//!
//! ## Per stage
//!
//! 1. No credential: skip (breaker untouched)
//! 2. Circuit open or probe already out: skip to the next stage
//! 3. Rate window exhausted: terminal `RateLimited`, no fallback
//! 4. Call on a spawned task under the provider timeout. The breaker verdict
//!    is recorded inside the task, so a caller that goes away never leaves a
//!    probe outstanding.
//! 5. Remote 429: terminal `RateLimited`, not a breaker failure
//! 6. Any other failure: next stage

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::circuit_breaker::{Admission, CircuitBreaker};
use super::health::SharedHealth;
use super::{
    ProviderError, ProviderErrorKind, ProviderResponse, SharedProvider, TokenUsage,
    create_provider,
};
use crate::ai::rate_limiter::RateDecision;
use crate::ai::timeout::with_provider_timeout;
use crate::config::{Config, RoutingConfig};
use crate::types::{Classification, Command, FlowError, Result, ToolDefinition};

/// Provider with its call timeout
#[derive(Clone)]
pub struct RoutedProvider {
    pub provider: SharedProvider,
    pub timeout: Duration,
}

impl RoutedProvider {
    pub fn new(provider: SharedProvider, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
    SkippedNoCredential,
    SkippedCircuitOpen,
    RateLimited,
}

/// One stage of a routing decision
#[derive(Debug, Clone, Serialize)]
pub struct RouteAttempt {
    pub provider: String,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl RouteAttempt {
    fn skipped(provider: &str, outcome: AttemptOutcome) -> Self {
        Self {
            provider: provider.to_string(),
            outcome,
            error: None,
            duration_ms: 0,
        }
    }

    fn summary(&self) -> String {
        match &self.error {
            Some(error) => format!("{}: {}", self.provider, error),
            None => format!("{}: {:?}", self.provider, self.outcome),
        }
    }
}

/// Successful routing result
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    /// Provider that answered
    pub provider: String,
    /// Raw, unvalidated tool calls
    pub tool_calls: Vec<Value>,
    pub text: Option<String>,
    pub usage: TokenUsage,
    pub attempts: Vec<RouteAttempt>,
    /// Answered by a provider other than the primary
    pub fell_back: bool,
}

pub struct ProviderRouter {
    providers: HashMap<String, RoutedProvider>,
    routing: RoutingConfig,
    health: SharedHealth,
}

impl ProviderRouter {
    pub fn new(routing: RoutingConfig, health: SharedHealth) -> Self {
        Self {
            providers: HashMap::new(),
            routing,
            health,
        }
    }

    /// Register a provider under its own name
    pub fn with_provider(mut self, provider: RoutedProvider) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    /// Build every configured provider client
    pub fn from_config(config: &Config, health: SharedHealth) -> Result<Self> {
        let mut router = Self::new(config.routing.clone(), health);
        for provider_config in &config.providers {
            let provider = create_provider(provider_config)?;
            if !provider.has_credential() {
                debug!(provider = %provider_config.name, "No credential resolved");
            }
            router = router.with_provider(RoutedProvider::new(
                provider,
                Duration::from_secs(provider_config.timeout_secs),
            ));
        }
        Ok(router)
    }

    pub fn health(&self) -> &SharedHealth {
        &self.health
    }

    /// Configured first choice for a classification
    pub fn primary_for(&self, classification: Classification) -> &str {
        match classification {
            Classification::FastPath => &self.routing.fast_path,
            Classification::ComplexPath => &self.routing.complex_path,
        }
    }

    /// Fallback for a primary, if one is configured and distinct
    pub fn fallback_for(&self, primary: &str) -> Option<&str> {
        self.routing
            .fallback
            .as_deref()
            .filter(|fallback| *fallback != primary)
    }

    fn lookup(&self, name: &str) -> Result<&RoutedProvider> {
        self.providers
            .get(name)
            .ok_or_else(|| FlowError::Config(format!("Provider '{}' is not registered", name)))
    }

    fn stages(&self, classification: Classification) -> Result<Vec<&RoutedProvider>> {
        let primary = self.primary_for(classification);
        let mut stages = vec![self.lookup(primary)?];
        if let Some(fallback) = self.fallback_for(primary) {
            stages.push(self.lookup(fallback)?);
        }
        Ok(stages)
    }

    /// Fail fast when no provider on the route could make a call
    pub fn ensure_credentials(&self, classification: Classification) -> Result<()> {
        let stages = self.stages(classification)?;
        if stages.iter().any(|s| s.provider.has_credential()) {
            Ok(())
        } else {
            Err(FlowError::MissingCredential {
                providers: stages.iter().map(|s| s.name().to_string()).collect(),
            })
        }
    }

    /// Route one command: primary, then fallback
    #[instrument(skip(self, command, tools), fields(classification = %classification))]
    pub async fn route(
        &self,
        classification: Classification,
        command: &Command,
        tools: &Arc<[ToolDefinition]>,
    ) -> Result<RouteOutcome> {
        self.ensure_credentials(classification)?;
        let stages = self.stages(classification)?;

        let mut attempts = Vec::with_capacity(stages.len());
        let mut last_failure: Option<ProviderError> = None;

        for (index, stage) in stages.into_iter().enumerate() {
            let name = stage.name().to_string();

            if !stage.provider.has_credential() {
                debug!(provider = %name, "Skipping provider (no credential)");
                attempts.push(RouteAttempt::skipped(&name, AttemptOutcome::SkippedNoCredential));
                continue;
            }

            let breaker = self.health.breaker(&name);
            let admission = breaker.try_acquire();
            if admission == Admission::Rejected {
                debug!(provider = %name, "Skipping provider (circuit OPEN)");
                attempts.push(RouteAttempt::skipped(&name, AttemptOutcome::SkippedCircuitOpen));
                continue;
            }

            if let RateDecision::Rejected { retry_after } = self.health.check_rate(&name) {
                if admission == Admission::Probe {
                    breaker.release_probe();
                }
                return Err(FlowError::RateLimited {
                    provider: name,
                    retry_after: Some(retry_after),
                });
            }

            debug!(provider = %name, stage = index, ?admission, "Dispatching provider call");
            let started = Instant::now();
            let result = dispatch(stage, command, tools, breaker, admission).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(response) => {
                    attempts.push(RouteAttempt {
                        provider: name.clone(),
                        outcome: AttemptOutcome::Succeeded,
                        error: None,
                        duration_ms,
                    });
                    if index > 0 {
                        info!(provider = %name, "Served by fallback provider");
                    }
                    return Ok(RouteOutcome {
                        provider: name,
                        tool_calls: response.tool_calls,
                        text: response.text,
                        usage: response.usage,
                        attempts,
                        fell_back: index > 0,
                    });
                }
                Err(err) if !err.should_fallback() => {
                    warn!(provider = %name, error = %err, "Provider throttled request");
                    return Err(FlowError::RateLimited {
                        provider: name,
                        retry_after: err.retry_after,
                    });
                }
                Err(err) => {
                    warn!(provider = %name, kind = %err.kind, error = %err, "Provider call failed");
                    attempts.push(RouteAttempt {
                        provider: name,
                        outcome: AttemptOutcome::Failed,
                        error: Some(err.to_string()),
                        duration_ms,
                    });
                    last_failure = Some(err);
                }
            }
        }

        let summaries = attempts.iter().map(RouteAttempt::summary).collect();
        match last_failure {
            Some(err) if err.kind == ProviderErrorKind::MalformedResponse => {
                Err(FlowError::MalformedResponse {
                    attempts: summaries,
                })
            }
            _ => Err(FlowError::ProviderUnavailable {
                attempts: summaries,
            }),
        }
    }
}

/// Run one provider call on its own task and record the breaker verdict there
async fn dispatch(
    stage: &RoutedProvider,
    command: &Command,
    tools: &Arc<[ToolDefinition]>,
    breaker: Arc<CircuitBreaker>,
    admission: Admission,
) -> std::result::Result<ProviderResponse, ProviderError> {
    let provider = Arc::clone(&stage.provider);
    let command = command.clone();
    let tools = Arc::clone(tools);
    let timeout = stage.timeout;
    let task_breaker = Arc::clone(&breaker);

    let handle = tokio::spawn(async move {
        let result =
            with_provider_timeout(timeout, provider.call(&command, &tools), provider.name()).await;
        match &result {
            Ok(_) => task_breaker.record_success(),
            Err(err) if err.counts_as_failure() => task_breaker.record_failure(),
            Err(_) => {
                if admission == Admission::Probe {
                    task_breaker.release_probe();
                }
            }
        }
        result
    });

    match handle.await {
        Ok(result) => result,
        Err(join_error) => {
            breaker.record_failure();
            Err(ProviderError::with_provider(
                ProviderErrorKind::Unavailable,
                format!("Provider task aborted: {}", join_error),
                stage.name(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::testing::ScriptedProvider;
    use crate::ai::provider::{CircuitBreakerConfig, CircuitState, ProviderHealth};
    use crate::ai::rate_limiter::RateLimit;
    use serde_json::json;

    fn health(threshold: u32, limit: u32) -> SharedHealth {
        ProviderHealth::new(
            CircuitBreakerConfig {
                failure_threshold: threshold,
                cool_down: Duration::from_millis(30),
            },
            RateLimit {
                limit,
                window: Duration::from_secs(60),
            },
        )
        .shared()
    }

    fn routing() -> RoutingConfig {
        RoutingConfig {
            fast_path: "primary".into(),
            complex_path: "primary".into(),
            fallback: Some("fallback".into()),
        }
    }

    fn router(
        primary: &Arc<ScriptedProvider>,
        fallback: &Arc<ScriptedProvider>,
        health: SharedHealth,
    ) -> ProviderRouter {
        ProviderRouter::new(routing(), health)
            .with_provider(RoutedProvider::new(primary.clone(), Duration::from_millis(200)))
            .with_provider(RoutedProvider::new(fallback.clone(), Duration::from_millis(200)))
    }

    fn tools() -> Arc<[ToolDefinition]> {
        Arc::from(Vec::new())
    }

    fn command() -> Command {
        Command::new("create a red rectangle", "c1")
    }

    fn one_call() -> Vec<Value> {
        vec![json!({"id": "t1", "name": "create_shape", "input": {}})]
    }

    #[tokio::test]
    async fn test_primary_success() {
        let primary = ScriptedProvider::new("primary").respond(one_call()).shared();
        let fallback = ScriptedProvider::new("fallback").shared();
        let router = router(&primary, &fallback, health(5, 10));

        let outcome = router
            .route(Classification::FastPath, &command(), &tools())
            .await
            .unwrap();

        assert_eq!(outcome.provider, "primary");
        assert!(!outcome.fell_back);
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_falls_back_once() {
        let primary = ScriptedProvider::new("primary")
            .fail(ProviderErrorKind::Unavailable)
            .shared();
        let fallback = ScriptedProvider::new("fallback").respond(one_call()).shared();
        let health = health(5, 10);
        let router = router(&primary, &fallback, health.clone());

        let outcome = router
            .route(Classification::FastPath, &command(), &tools())
            .await
            .unwrap();

        assert_eq!(outcome.provider, "fallback");
        assert!(outcome.fell_back);
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::Failed);
        assert_eq!(health.breaker("primary").stats().consecutive_failures, 1);
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_open_circuit_skips_primary() {
        let primary = ScriptedProvider::new("primary").shared();
        let fallback = ScriptedProvider::new("fallback").respond(one_call()).shared();
        let health = health(1, 10);
        health.breaker("primary").record_failure();
        let router = router(&primary, &fallback, health);

        let outcome = router
            .route(Classification::FastPath, &command(), &tools())
            .await
            .unwrap();

        assert_eq!(outcome.provider, "fallback");
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::SkippedCircuitOpen);
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_local_rate_limit_is_terminal() {
        let primary = ScriptedProvider::new("primary").shared();
        let fallback = ScriptedProvider::new("fallback").shared();
        let health = health(5, 1);
        assert!(health.check_rate("primary").is_allowed());
        let router = router(&primary, &fallback, health.clone());

        let err = router
            .route(Classification::FastPath, &command(), &tools())
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::RateLimited { ref provider, .. } if provider == "primary"));
        assert_eq!(primary.calls(), 0);
        assert_eq!(fallback.calls(), 0);
        assert_eq!(health.breaker("primary").stats().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_remote_429_is_terminal_and_not_a_failure() {
        let primary = ScriptedProvider::new("primary")
            .fail(ProviderErrorKind::RemoteRateLimited)
            .shared();
        let fallback = ScriptedProvider::new("fallback").shared();
        let health = health(1, 10);
        let router = router(&primary, &fallback, health.clone());

        let err = router
            .route(Classification::FastPath, &command(), &tools())
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::RateLimited { .. }));
        assert_eq!(fallback.calls(), 0);
        assert_eq!(health.breaker("primary").state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_exhaustion_names_both_attempts() {
        let primary = ScriptedProvider::new("primary")
            .fail(ProviderErrorKind::Timeout)
            .shared();
        let fallback = ScriptedProvider::new("fallback")
            .fail(ProviderErrorKind::Unavailable)
            .shared();
        let router = router(&primary, &fallback, health(5, 10));

        match router
            .route(Classification::ComplexPath, &command(), &tools())
            .await
        {
            Err(FlowError::ProviderUnavailable { attempts }) => {
                assert_eq!(attempts.len(), 2);
                assert!(attempts[0].starts_with("primary"));
                assert!(attempts[1].starts_with("fallback"));
            }
            other => panic!("expected ProviderUnavailable, got {:?}", other.map(|o| o.provider)),
        }
    }

    #[tokio::test]
    async fn test_malformed_exhaustion() {
        let primary = ScriptedProvider::new("primary")
            .fail(ProviderErrorKind::MalformedResponse)
            .shared();
        let fallback = ScriptedProvider::new("fallback")
            .fail(ProviderErrorKind::MalformedResponse)
            .shared();
        let router = router(&primary, &fallback, health(5, 10));

        let err = router
            .route(Classification::FastPath, &command(), &tools())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let primary = ScriptedProvider::new("primary").without_credential().shared();
        let fallback = ScriptedProvider::new("fallback").without_credential().shared();
        let router = router(&primary, &fallback, health(5, 10));

        let err = router
            .route(Classification::FastPath, &command(), &tools())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::MissingCredential { ref providers } if providers.len() == 2));
        assert_eq!(primary.calls() + fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_uncredentialed_primary_is_skipped() {
        let primary = ScriptedProvider::new("primary").without_credential().shared();
        let fallback = ScriptedProvider::new("fallback").respond(one_call()).shared();
        let health = health(1, 10);
        let router = router(&primary, &fallback, health.clone());

        let outcome = router
            .route(Classification::FastPath, &command(), &tools())
            .await
            .unwrap();
        assert_eq!(outcome.provider, "fallback");
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::SkippedNoCredential);
        assert_eq!(health.breaker("primary").state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_same_fallback_is_not_retried() {
        let primary = ScriptedProvider::new("primary")
            .fail(ProviderErrorKind::Unavailable)
            .shared();
        let router = ProviderRouter::new(
            RoutingConfig {
                fast_path: "primary".into(),
                complex_path: "primary".into(),
                fallback: Some("primary".into()),
            },
            health(5, 10),
        )
        .with_provider(RoutedProvider::new(primary.clone(), Duration::from_secs(1)));

        assert!(router.fallback_for("primary").is_none());
        let err = router
            .route(Classification::FastPath, &command(), &tools())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::ProviderUnavailable { .. }));
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_timed_out_probe_reopens_circuit() {
        let primary = ScriptedProvider::new("primary")
            .with_delay(Duration::from_millis(500))
            .shared();
        let fallback = ScriptedProvider::new("fallback").respond(one_call()).shared();
        let health = health(1, 10);
        health.breaker("primary").record_failure();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let router = router(&primary, &fallback, health.clone());
        let outcome = router
            .route(Classification::FastPath, &command(), &tools())
            .await
            .unwrap();

        assert_eq!(outcome.provider, "fallback");
        assert_eq!(health.breaker("primary").state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_verdict_recorded_after_caller_leaves() {
        let primary = ScriptedProvider::new("primary")
            .fail(ProviderErrorKind::Unavailable)
            .with_delay(Duration::from_millis(50))
            .shared();
        let fallback = ScriptedProvider::new("fallback").shared();
        let health = health(5, 10);
        let router = router(&primary, &fallback, health.clone());

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            router.route(Classification::FastPath, &command(), &tools()),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(primary.calls(), 1);
        assert_eq!(health.breaker("primary").stats().consecutive_failures, 1);
        assert_eq!(fallback.calls(), 0);
    }
}
