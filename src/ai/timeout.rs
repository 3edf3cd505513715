//! Timeout helpers
//!
//! Every suspending operation outside the provider call itself (canvas
//! lookups before routing) and the provider call (inside the router task)
//! goes through one of these wrappers, so a hung dependency surfaces as a
//! classified timeout instead of a stuck request.

use std::future::Future;
use std::time::Duration;

use crate::config::Config;
use crate::constants::network as net_constants;
use crate::types::{FlowError, ProviderError, ProviderErrorKind, Result};

/// Timeouts applied around suspending operations
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Canvas store round trips made before routing
    pub store_lookup: Duration,
    /// TCP connect for provider HTTP clients
    pub connection: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            store_lookup: Duration::from_secs(net_constants::STORE_TIMEOUT_SECS),
            connection: Duration::from_secs(net_constants::CONNECTION_TIMEOUT_SECS),
        }
    }
}

impl TimeoutConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            store_lookup: Duration::from_secs(config.execution.store_timeout_secs.max(1)),
            ..Self::default()
        }
    }
}

/// Execute an async operation with a timeout
///
/// Returns `FlowError::Timeout` if the operation doesn't complete in time.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(FlowError::timeout(operation_name, timeout)),
    }
}

/// Execute a provider call with a timeout.
///
/// Expiry becomes `ProviderErrorKind::Timeout`, which the breaker counts as a failure.
pub async fn with_provider_timeout<T, F>(
    timeout: Duration,
    future: F,
    provider: &str,
) -> std::result::Result<T, ProviderError>
where
    F: Future<Output = std::result::Result<T, ProviderError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::with_provider(
            ProviderErrorKind::Timeout,
            format!("No response within {:?}", timeout),
            provider,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_config_from_config() {
        let mut config = Config::default();
        config.execution.store_timeout_secs = 3;
        let timeouts = TimeoutConfig::from_config(&config);
        assert_eq!(timeouts.store_lookup, Duration::from_secs(3));
        assert_eq!(timeouts.connection, TimeoutConfig::default().connection);
    }

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, FlowError>(42) },
            "test operation",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, FlowError>(42)
            },
            "slow operation",
        )
        .await;
        assert!(matches!(result.unwrap_err(), FlowError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_provider_timeout_is_classified() {
        let result: std::result::Result<(), _> = with_provider_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            },
            "openai",
        )
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Timeout);
        assert!(err.counts_as_failure());
        assert_eq!(err.provider.as_deref(), Some("openai"));
    }
}
