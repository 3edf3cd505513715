//! Configuration Types
//!
//! All configuration structures with defaults taken from `constants`.
//! Supports global (~/.config/canvasflow/) and project (.canvasflow/) level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::{canvas, circuit_breaker, execution, network, rate_limit, storage};
use crate::types::{FlowError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Provider backends, referenced by name from `routing`
    pub providers: Vec<ProviderConfig>,

    /// Primary/fallback assignment per classification
    pub routing: RoutingConfig,

    /// Default per-provider admission window
    pub rate_limit: RateLimitConfig,

    /// Per-provider breaker tuning
    pub circuit_breaker: CircuitBreakerSettings,

    /// Defaults applied to created objects
    pub canvas: CanvasConfig,

    /// Tool execution tuning
    pub execution: ExecutionConfig,

    /// Canvas persistence
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            providers: vec![ProviderConfig::openai(), ProviderConfig::anthropic()],
            routing: RoutingConfig::default(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            canvas: CanvasConfig::default(),
            execution: ExecutionConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `FlowError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(FlowError::Config(
                "At least one provider must be configured".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.name.as_str()) {
                return Err(FlowError::Config(format!(
                    "Duplicate provider name: {}",
                    provider.name
                )));
            }
            provider.validate()?;
        }

        for (role, name) in self.routing.references() {
            if self.provider(name).is_none() {
                return Err(FlowError::Config(format!(
                    "routing.{} references unknown provider '{}'",
                    role, name
                )));
            }
        }

        self.rate_limit.validate("rate_limit")?;

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(FlowError::Config(
                "circuit_breaker.failure_threshold must be greater than 0".to_string(),
            ));
        }
        if self.circuit_breaker.cool_down_secs == 0 {
            return Err(FlowError::Config(
                "circuit_breaker.cool_down_secs must be greater than 0".to_string(),
            ));
        }

        if !(self.canvas.default_width > 0.0 && self.canvas.default_height > 0.0) {
            return Err(FlowError::Config(format!(
                "canvas default size must be positive, got {}x{}",
                self.canvas.default_width, self.canvas.default_height
            )));
        }

        if self.execution.max_concurrency == 0 {
            return Err(FlowError::Config(
                "execution.max_concurrency must be greater than 0".to_string(),
            ));
        }
        if self.execution.max_repeat == 0 {
            return Err(FlowError::Config(
                "execution.max_repeat must be greater than 0".to_string(),
            ));
        }
        if !(self.execution.repeat_spacing >= 1.0) {
            return Err(FlowError::Config(format!(
                "execution.repeat_spacing must be at least 1.0, got {}",
                self.execution.repeat_spacing
            )));
        }

        Ok(())
    }

    /// Look up a provider by name
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}

// =============================================================================
// Provider Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Chat Completions function-calling protocol (OpenAI and compatible endpoints)
    OpenAi,
    /// Anthropic Messages API with native tool use
    Anthropic,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Anthropic => write!(f, "anthropic"),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Name used by routing, rate limiting and circuit breaking
    pub name: String,

    pub kind: ProviderKind,

    pub base_url: String,

    pub model: String,

    /// Inline credential. Never written back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Environment variable holding the credential
    pub api_key_env: Option<String>,

    /// Outbound call timeout
    pub timeout_secs: u64,

    pub temperature: f32,

    pub max_tokens: u32,

    /// Overrides the global admission window for this provider
    pub rate_limit: Option<RateLimitConfig>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_key_env", &self.api_key_env)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::openai()
    }
}

impl ProviderConfig {
    pub fn openai() -> Self {
        Self {
            name: "openai".to_string(),
            kind: ProviderKind::OpenAi,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            temperature: 0.2,
            max_tokens: 4096,
            rate_limit: None,
        }
    }

    pub fn anthropic() -> Self {
        Self {
            name: "anthropic".to_string(),
            kind: ProviderKind::Anthropic,
            base_url: "https://api.anthropic.com/v1".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key: None,
            api_key_env: Some("ANTHROPIC_API_KEY".to_string()),
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            temperature: 0.2,
            max_tokens: 4096,
            rate_limit: None,
        }
    }

    /// Resolve the credential: inline key first, then the named env var.
    /// Blank values count as absent.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| {
                self.api_key_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
            })
            .filter(|key| !key.trim().is_empty())
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(FlowError::Config("Provider name cannot be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(FlowError::Config(format!(
                "providers.{}.timeout_secs must be greater than 0",
                self.name
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(FlowError::Config(format!(
                "providers.{}.temperature must be between 0.0 and 2.0, got {}",
                self.name, self.temperature
            )));
        }
        if let Some(limit) = &self.rate_limit {
            limit.validate(&format!("providers.{}.rate_limit", self.name))?;
        }
        Ok(())
    }
}

// =============================================================================
// Routing Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Primary provider for fast-path commands
    pub fast_path: String,

    /// Primary provider for complex-path commands
    pub complex_path: String,

    /// Provider tried only after the primary is skipped or fails
    pub fallback: Option<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            fast_path: "openai".to_string(),
            complex_path: "openai".to_string(),
            fallback: Some("anthropic".to_string()),
        }
    }
}

impl RoutingConfig {
    fn references(&self) -> Vec<(&'static str, &str)> {
        let mut refs = vec![
            ("fast_path", self.fast_path.as_str()),
            ("complex_path", self.complex_path.as_str()),
        ];
        if let Some(fallback) = &self.fallback {
            refs.push(("fallback", fallback.as_str()));
        }
        refs
    }
}

// =============================================================================
// Resilience Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Fixed window length
    pub window_secs: u64,

    /// Requests admitted per window
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: rate_limit::WINDOW_SECS,
            max_requests: rate_limit::MAX_REQUESTS,
        }
    }
}

impl RateLimitConfig {
    fn validate(&self, path: &str) -> Result<()> {
        if self.window_secs == 0 {
            return Err(FlowError::Config(format!(
                "{}.window_secs must be greater than 0",
                path
            )));
        }
        if self.max_requests == 0 {
            return Err(FlowError::Config(format!(
                "{}.max_requests must be greater than 0",
                path
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures before opening
    pub failure_threshold: u32,

    /// Time before a recovery probe is admitted
    pub cool_down_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: circuit_breaker::FAILURE_THRESHOLD,
            cool_down_secs: circuit_breaker::COOL_DOWN_SECS,
        }
    }
}

// =============================================================================
// Canvas & Execution Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub default_width: f64,
    pub default_height: f64,
    pub default_color: String,
    pub default_text_color: String,
    pub default_sticky_color: String,
    pub default_font_size: f64,
    pub sticky_note_size: f64,

    /// Gap used by arrange/distribute when the call gives none
    pub layout_spacing: f64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            default_width: canvas::DEFAULT_WIDTH,
            default_height: canvas::DEFAULT_HEIGHT,
            default_color: canvas::DEFAULT_COLOR.to_string(),
            default_text_color: canvas::DEFAULT_TEXT_COLOR.to_string(),
            default_sticky_color: canvas::DEFAULT_STICKY_COLOR.to_string(),
            default_font_size: canvas::DEFAULT_FONT_SIZE,
            sticky_note_size: canvas::STICKY_NOTE_SIZE,
            layout_spacing: canvas::LAYOUT_SPACING,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Tool-call jobs in flight per command
    pub max_concurrency: usize,

    /// Upper bound on a creation call's `count`
    pub max_repeat: u32,

    /// Step between repeated objects as a multiple of their size
    pub repeat_spacing: f64,

    /// Timeout for store lookups made before routing
    pub store_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: execution::MAX_CONCURRENCY,
            max_repeat: execution::MAX_REPEAT,
            repeat_spacing: execution::REPEAT_SPACING,
            store_timeout_secs: network::STORE_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Connection pool size
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(storage::DEFAULT_DATABASE_PATH),
            max_connections: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.routing.fallback.as_deref(), Some("anthropic"));
    }

    #[test]
    fn test_unknown_routing_reference_rejected() {
        let mut config = Config::default();
        config.routing.fallback = Some("missing".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("routing.fallback"));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = Config::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rate_limit.window_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.execution.repeat_spacing = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let mut config = Config::default();
        config.providers.push(ProviderConfig::openai());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inline_key_wins_and_blank_is_absent() {
        let mut provider = ProviderConfig::openai();
        provider.api_key_env = Some("CANVASFLOW_TEST_UNSET_KEY".to_string());
        assert!(provider.resolve_api_key().is_none());

        provider.api_key = Some("   ".to_string());
        assert!(provider.resolve_api_key().is_none());

        provider.api_key = Some("sk-inline".to_string());
        assert_eq!(provider.resolve_api_key().as_deref(), Some("sk-inline"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let mut provider = ProviderConfig::anthropic();
        provider.api_key = Some("sk-secret".to_string());
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut provider = ProviderConfig::openai();
        provider.api_key = Some("sk-secret".to_string());
        let toml = toml::to_string(&provider).unwrap();
        assert!(!toml.contains("sk-secret"));
    }
}
