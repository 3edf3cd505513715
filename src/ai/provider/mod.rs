//! LLM Provider Abstraction
//!
//! Defines the `ProviderClient` trait: one uniform contract over heterogeneous
//! chat-completion APIs with tool calling. Clients never retry; retry and
//! fallback policy lives entirely in the router.
//!
//! ## Modules
//!
//! - `router`: primary/fallback selection over breaker and limiter state
//! - `circuit_breaker`: per-provider failure-state machine
//! - `health`: registry owning each provider's breaker and rate window
//! - `openai` / `anthropic`: HTTP clients
//! - `prompt`: system prompt assembly

mod anthropic;
mod circuit_breaker;
mod health;
mod openai;
mod prompt;
mod router;
#[cfg(test)]
pub(crate) mod testing;

pub use anthropic::AnthropicProvider;
pub use circuit_breaker::{
    Admission, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
};
pub use health::{ProviderHealth, ProviderHealthSnapshot, SharedHealth};
pub use openai::OpenAiProvider;
pub use prompt::build_system_prompt;
pub use router::{AttemptOutcome, ProviderRouter, RouteAttempt, RouteOutcome, RoutedProvider};

pub use crate::types::{ErrorClassifier, ProviderError, ProviderErrorKind};

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ProviderConfig, ProviderKind};
use crate::types::{Command, FlowError, Result, ToolDefinition};

// =============================================================================
// Provider Response
// =============================================================================

/// Provider-agnostic answer to one command
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    /// Raw tool calls, `{id, name, input}` shaped but not yet validated
    pub tool_calls: Vec<Value>,
    /// Free text the model returned alongside (or instead of) tool calls
    pub text: Option<String>,
    pub usage: TokenUsage,
    pub timing: ResponseTiming,
    pub metadata: ResponseMetadata,
}

/// Token usage metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Response timing metrics
#[derive(Debug, Clone, Default)]
pub struct ResponseTiming {
    /// Wall clock in milliseconds
    pub total_ms: u64,
}

impl ResponseTiming {
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            total_ms: duration.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    pub model: String,
    pub provider: String,
}

// =============================================================================
// Provider Descriptor
// =============================================================================

/// Static description of one backend: `{name, base_url, model, credential}`
#[derive(Clone)]
pub struct ProviderDescriptor {
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub credential: Option<SecretString>,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl std::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderDescriptor {
    /// Resolve a provider config: validates the endpoint and looks up the credential
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            base_url: validate_base_url(&config.name, &config.base_url)?,
            model: config.model.clone(),
            credential: config.resolve_api_key().map(SecretString::from),
            timeout: Duration::from_secs(config.timeout_secs),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    /// Endpoint under the base URL
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Only http/https; trailing slash stripped
fn validate_base_url(provider: &str, base_url: &str) -> Result<String> {
    let url = url::Url::parse(base_url).map_err(|e| {
        FlowError::Config(format!(
            "Invalid base_url for provider '{}' ('{}'): {}",
            provider, base_url, e
        ))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(FlowError::Config(format!(
            "Provider '{}' base_url must use http or https, got: {}",
            provider,
            url.scheme()
        )));
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}

// =============================================================================
// Provider Client Trait
// =============================================================================

/// Uniform contract over one chat-completion backend
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Send the command and tool catalogue; return raw tool calls.
    ///
    /// Errors are always classified; raw transport errors never escape.
    async fn call(
        &self,
        command: &Command,
        tools: &[ToolDefinition],
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Provider name for routing, logging and health tracking
    fn name(&self) -> &str;

    /// Model name currently in use
    fn model(&self) -> &str;

    /// Whether a credential was resolved at startup
    fn has_credential(&self) -> bool;
}

pub type SharedProvider = Arc<dyn ProviderClient>;

/// Build the HTTP client shared by both provider kinds
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(crate::ai::timeout::TimeoutConfig::default().connection)
        .build()
        .map_err(|e| FlowError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Create a shared provider from configuration
pub fn create_provider(config: &ProviderConfig) -> Result<SharedProvider> {
    let descriptor = ProviderDescriptor::from_config(config)?;
    match config.kind {
        ProviderKind::OpenAi => Ok(Arc::new(OpenAiProvider::new(descriptor)?)),
        ProviderKind::Anthropic => Ok(Arc::new(AnthropicProvider::new(descriptor)?)),
    }
}
