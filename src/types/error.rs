//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//!
//! ## Layers
//!
//! - **ProviderError**: what a provider client reports. The router and
//!   circuit breaker reason only over `ProviderErrorKind`, never over raw
//!   transport errors.
//! - **ToolCallError**: structural defects in a provider-returned tool call.
//! - **FlowError**: the application error. Every variant maps onto one
//!   `ErrorKind`, and user-visible messages derive from the kind alone.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Kinds
// =============================================================================

/// Command-level error taxonomy surfaced to callers and telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// No provider on the route has a usable credential
    MissingCredential,
    /// Admission window exhausted (locally or remotely)
    RateLimited,
    /// Circuit open and/or every attempted provider failed
    ProviderUnavailable,
    /// Provider answered with something that could not be decoded
    MalformedProviderResponse,
    /// Tool call missing `id`/`name`/`input` or with wrong shapes
    InvalidToolCall,
    /// Structurally valid tool call naming an unregistered tool
    UnknownTool,
    /// Referenced canvas object does not exist
    ObjectNotFound,
    /// Atomic creation batch rejected as a whole
    BatchInsertFailed,
    /// Target canvas does not exist
    CanvasNotFound,
    /// Tool input failed per-tool typed decoding
    InvalidArguments,
    /// Configuration problem
    Config,
    /// Storage backend failure
    Storage,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// Stable camelCase identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missingCredential",
            Self::RateLimited => "rateLimited",
            Self::ProviderUnavailable => "providerUnavailable",
            Self::MalformedProviderResponse => "malformedProviderResponse",
            Self::InvalidToolCall => "invalidToolCall",
            Self::UnknownTool => "unknownTool",
            Self::ObjectNotFound => "objectNotFound",
            Self::BatchInsertFailed => "batchInsertFailed",
            Self::CanvasNotFound => "canvasNotFound",
            Self::InvalidArguments => "invalidArguments",
            Self::Config => "config",
            Self::Storage => "storage",
            Self::Internal => "internal",
        }
    }

    /// Message shown to end users. Never includes transport detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MissingCredential => "The AI assistant is not configured. Please contact an administrator.",
            Self::RateLimited => "Too many requests right now. Please wait a moment and try again.",
            Self::ProviderUnavailable => "The AI assistant is temporarily unavailable. Please try again shortly.",
            Self::MalformedProviderResponse => "The AI assistant returned an unexpected response. Please rephrase and try again.",
            Self::InvalidToolCall => "The AI assistant produced an invalid action. Please rephrase and try again.",
            Self::UnknownTool => "The AI assistant tried an action that is not supported.",
            Self::ObjectNotFound => "One of the referenced objects no longer exists.",
            Self::BatchInsertFailed => "The requested objects could not be created.",
            Self::CanvasNotFound => "This board could not be found.",
            Self::InvalidArguments => "The AI assistant supplied invalid details for an action.",
            Self::Config | Self::Storage | Self::Internal => "Something went wrong. Please try again.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Provider Error
// =============================================================================

/// Provider-level failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    /// Credential rejected (401/403)
    Auth,
    /// Provider throttled us (429)
    RemoteRateLimited,
    /// Response body could not be decoded
    MalformedResponse,
    /// No answer within the call timeout
    Timeout,
    /// 5xx, connection failure or any other non-success
    Unavailable,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth => write!(f, "AUTH"),
            Self::RemoteRateLimited => write!(f, "RATE_LIMIT"),
            Self::MalformedResponse => write!(f, "MALFORMED_RESPONSE"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
        }
    }
}

impl ProviderErrorKind {
    /// Whether this outcome counts toward the provider's circuit breaker.
    ///
    /// Throttling is congestion, not an outage.
    pub fn counts_as_failure(&self) -> bool {
        !matches!(self, Self::RemoteRateLimited)
    }

    /// Whether the router may try the fallback provider after this outcome
    pub fn should_fallback(&self) -> bool {
        !matches!(self, Self::RemoteRateLimited)
    }
}

/// Provider error with kind, context, and retry hints
#[derive(Debug, Clone)]
pub struct ProviderError {
    /// Error kind for routing decisions
    pub kind: ProviderErrorKind,
    /// Detailed error message (logs only)
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
    /// Suggested wait time before retry (if the provider sent one)
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.kind, self.message)
        } else {
            write!(f, "[{}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: None,
            retry_after: None,
        }
    }

    pub fn with_provider(
        kind: ProviderErrorKind,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: Some(provider.into()),
            retry_after: None,
        }
    }

    /// Add suggested retry delay
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn counts_as_failure(&self) -> bool {
        self.kind.counts_as_failure()
    }

    pub fn should_fallback(&self) -> bool {
        self.kind.should_fallback()
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps raw HTTP outcomes onto `ProviderErrorKind`
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a non-success HTTP status
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> ProviderError {
        let kind = match status {
            401 | 403 => ProviderErrorKind::Auth,
            429 => ProviderErrorKind::RemoteRateLimited,
            408 | 504 => ProviderErrorKind::Timeout,
            _ => ProviderErrorKind::Unavailable,
        };
        ProviderError::with_provider(kind, format!("HTTP {}: {}", status, message), provider)
    }

    /// Classify a transport-level failure
    pub fn classify_transport(err: &reqwest::Error, provider: &str) -> ProviderError {
        let kind = if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else if err.is_decode() {
            ProviderErrorKind::MalformedResponse
        } else {
            ProviderErrorKind::Unavailable
        };
        ProviderError::with_provider(kind, err.to_string(), provider)
    }

    /// Parse a `Retry-After` header value given in whole seconds
    pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
        value
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| Duration::from_secs(secs.min(300)))
    }
}

// =============================================================================
// Tool Call Error
// =============================================================================

/// Structural defect in a provider-returned tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCallDefect {
    /// The call is not a JSON object at all
    NotAnObject,
    /// One or more of `id`, `name`, `input` is absent
    MissingFields(Vec<&'static str>),
    /// A field is present with the wrong primitive shape
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    /// `input` arrived as a string that is not a JSON object
    InputParse(String),
}

/// Structural tool-call validation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallError {
    /// Position of the offending call in the provider response
    pub index: Option<usize>,
    pub defect: ToolCallDefect,
}

impl std::fmt::Display for ToolCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(index) = self.index {
            write!(f, "tool call #{}: ", index)?;
        }
        match &self.defect {
            ToolCallDefect::NotAnObject => write!(f, "not a JSON object"),
            ToolCallDefect::MissingFields(fields) => {
                write!(f, "missing fields: {}", fields.join(", "))
            }
            ToolCallDefect::WrongType { field, expected } => {
                write!(f, "field '{}' must be {}", field, expected)
            }
            ToolCallDefect::InputParse(reason) => {
                write!(f, "input is not a valid JSON object: {}", reason)
            }
        }
    }
}

impl std::error::Error for ToolCallError {}

impl ToolCallError {
    pub fn new(defect: ToolCallDefect) -> Self {
        Self {
            index: None,
            defect,
        }
    }

    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Fields reported missing (empty for other defects)
    pub fn missing_fields(&self) -> &[&'static str] {
        match &self.defect {
            ToolCallDefect::MissingFields(fields) => fields,
            _ => &[],
        }
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum FlowError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Routing Errors
    // -------------------------------------------------------------------------
    #[error("No usable credential for providers: {}", providers.join(", "))]
    MissingCredential { providers: Vec<String> },

    #[error("Rate limited by {provider}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("No provider available: {}", attempts.join("; "))]
    ProviderUnavailable { attempts: Vec<String> },

    #[error("Malformed provider response: {}", attempts.join("; "))]
    MalformedResponse { attempts: Vec<String> },

    // -------------------------------------------------------------------------
    // Command Errors
    // -------------------------------------------------------------------------
    #[error("Invalid tool call: {0}")]
    InvalidToolCall(ToolCallError),

    #[error("Canvas not found: {0}")]
    CanvasNotFound(String),

    #[error("Canvas store error: {0}")]
    Store(#[from] crate::canvas::StoreError),

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    // -------------------------------------------------------------------------
    // Infrastructure Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ToolCallError> for FlowError {
    fn from(err: ToolCallError) -> Self {
        FlowError::InvalidToolCall(err)
    }
}

impl From<r2d2::Error> for FlowError {
    fn from(err: r2d2::Error) -> Self {
        FlowError::Storage(format!("Connection pool error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;

impl FlowError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Map onto the command-level taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential { .. } => ErrorKind::MissingCredential,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            Self::MalformedResponse { .. } => ErrorKind::MalformedProviderResponse,
            Self::InvalidToolCall(_) => ErrorKind::InvalidToolCall,
            Self::CanvasNotFound(_) => ErrorKind::CanvasNotFound,
            Self::Store(e) => e.kind(),
            Self::Config(_) => ErrorKind::Config,
            Self::Database(_) | Self::Storage(_) | Self::Timeout { .. } => ErrorKind::Storage,
            Self::Io(_) | Self::Json(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// User-facing message (derived from the kind only)
    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }

    /// Text safe to show an operator at the terminal.
    ///
    /// Routing and provider errors carry attempt summaries with raw response
    /// bodies, so they render through the kind. Local errors (config, storage,
    /// missing canvas) keep their own message.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::MissingCredential
            | ErrorKind::RateLimited
            | ErrorKind::ProviderUnavailable
            | ErrorKind::MalformedProviderResponse
            | ErrorKind::InvalidToolCall => self.kind().user_message().to_string(),
            _ => self.to_string(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::RateLimited.to_string(), "rateLimited");
        assert_eq!(ErrorKind::ObjectNotFound.to_string(), "objectNotFound");
        assert_eq!(
            serde_json::to_value(ErrorKind::BatchInsertFailed).unwrap(),
            serde_json::json!("batchInsertFailed")
        );
    }

    #[test]
    fn test_throttling_is_not_an_outage() {
        assert!(!ProviderErrorKind::RemoteRateLimited.counts_as_failure());
        assert!(!ProviderErrorKind::RemoteRateLimited.should_fallback());
        assert!(ProviderErrorKind::Timeout.counts_as_failure());
        assert!(ProviderErrorKind::MalformedResponse.should_fallback());
        assert!(ProviderErrorKind::Auth.should_fallback());
    }

    #[test]
    fn test_classify_http_status() {
        let auth = ErrorClassifier::classify_http_status(401, "Unauthorized", "openai");
        assert_eq!(auth.kind, ProviderErrorKind::Auth);

        let limited = ErrorClassifier::classify_http_status(429, "slow down", "openai");
        assert_eq!(limited.kind, ProviderErrorKind::RemoteRateLimited);

        let gateway = ErrorClassifier::classify_http_status(504, "gateway timeout", "openai");
        assert_eq!(gateway.kind, ProviderErrorKind::Timeout);

        let server = ErrorClassifier::classify_http_status(503, "overloaded", "openai");
        assert_eq!(server.kind, ProviderErrorKind::Unavailable);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(
            ErrorClassifier::parse_retry_after(Some("12")),
            Some(Duration::from_secs(12))
        );
        assert_eq!(
            ErrorClassifier::parse_retry_after(Some("9000")),
            Some(Duration::from_secs(300))
        );
        assert_eq!(ErrorClassifier::parse_retry_after(Some("soon")), None);
        assert_eq!(ErrorClassifier::parse_retry_after(None), None);
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::with_provider(ProviderErrorKind::Timeout, "no answer", "anthropic");
        assert_eq!(err.to_string(), "[anthropic:TIMEOUT] no answer");

        let bare = ProviderError::new(ProviderErrorKind::Unavailable, "connection refused");
        assert_eq!(bare.to_string(), "[UNAVAILABLE] connection refused");
    }

    #[test]
    fn test_flow_error_kinds() {
        let err = FlowError::RateLimited {
            provider: "openai".into(),
            retry_after: None,
        };
        assert_eq!(err.kind(), ErrorKind::RateLimited);

        let invalid = FlowError::from(
            ToolCallError::new(ToolCallDefect::MissingFields(vec!["id"])).at(2),
        );
        assert_eq!(invalid.kind(), ErrorKind::InvalidToolCall);
        assert_eq!(
            invalid.to_string(),
            "Invalid tool call: tool call #2: missing fields: id"
        );
    }

    #[test]
    fn test_user_message_hides_transport_detail() {
        let err = FlowError::ProviderUnavailable {
            attempts: vec!["openai: connection refused at 10.0.0.3:443".into()],
        };
        assert!(!err.user_message().contains("10.0.0.3"));
    }

    #[test]
    fn test_public_message_drops_response_bodies() {
        let upstream = ProviderError::with_provider(
            ProviderErrorKind::Unavailable,
            "HTTP 503: {\"error\":\"upstream connect error 10.0.0.3:443\"}",
            "openai",
        );
        let unavailable = FlowError::ProviderUnavailable {
            attempts: vec![format!("openai: {}", upstream)],
        };
        assert!(unavailable.to_string().contains("10.0.0.3"));
        assert_eq!(
            unavailable.public_message(),
            ErrorKind::ProviderUnavailable.user_message()
        );

        let malformed = FlowError::MalformedResponse {
            attempts: vec!["anthropic: expected value at line 1 column 1".into()],
        };
        assert!(!malformed.public_message().contains("line 1"));

        let limited = FlowError::RateLimited {
            provider: "openai".into(),
            retry_after: None,
        };
        assert_eq!(limited.public_message(), ErrorKind::RateLimited.user_message());
    }

    #[test]
    fn test_public_message_keeps_local_detail() {
        let config = FlowError::Config("Not initialized. Run 'canvasflow init' first.".into());
        assert!(config.public_message().contains("canvasflow init"));

        let missing = FlowError::CanvasNotFound("board-9".into());
        assert!(missing.public_message().contains("board-9"));
    }
}
