//! Anthropic Messages Provider
//!
//! Native tool-use shape: tools go out as `{name, description, input_schema}`
//! and come back as `tool_use` content blocks whose `input` is already an
//! object.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::{debug, info};

use super::{
    ErrorClassifier, ProviderClient, ProviderDescriptor, ProviderError, ProviderErrorKind,
    ProviderResponse, ResponseMetadata, ResponseTiming, TokenUsage, build_http_client,
    build_system_prompt,
};
use crate::types::{Command, Result, ToolDefinition};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    name: String,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("name", &self.name)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(descriptor: ProviderDescriptor) -> Result<Self> {
        let client = build_http_client(descriptor.timeout)?;
        Ok(Self {
            name: descriptor.name,
            api_key: descriptor.credential,
            base_url: descriptor.base_url,
            model: descriptor.model,
            temperature: descriptor.temperature,
            max_tokens: descriptor.max_tokens,
            client,
        })
    }

    fn build_request(&self, command: &Command, tools: &[ToolDefinition]) -> MessagesRequest {
        MessagesRequest {
            model: self.model.clone(),
            system: build_system_prompt(command, tools),
            messages: vec![RequestMessage {
                role: "user",
                content: command.text.clone(),
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tools: tools
                .iter()
                .map(|t| ToolSpec {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.input_schema.clone(),
                })
                .collect(),
        }
    }

    fn error(&self, kind: ProviderErrorKind, message: impl Into<String>) -> ProviderError {
        ProviderError::with_provider(kind, message, &self.name)
    }
}

/// `tool_use` block -> `{id, name, input}`, copying only present fields
fn tool_use_to_call(block: &Map<String, Value>) -> Value {
    let mut call = Map::new();
    for key in ["id", "name", "input"] {
        if let Some(value) = block.get(key) {
            call.insert(key.to_string(), value.clone());
        }
    }
    Value::Object(call)
}

#[async_trait]
impl ProviderClient for AnthropicProvider {
    async fn call(
        &self,
        command: &Command,
        tools: &[ToolDefinition],
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| self.error(ProviderErrorKind::Auth, "No credential configured"))?;

        info!(provider = %self.name, model = %self.model, "Calling messages API");

        let start_time = Instant::now();
        let request = self.build_request(command, tools);
        let url = format!("{}/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, &self.name))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = ErrorClassifier::parse_retry_after(
                response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok()),
            );
            let body = response.text().await.unwrap_or_default();
            // 529 is Anthropic's "overloaded"; Unavailable like any other 5xx
            let mut err = ErrorClassifier::classify_http_status(status.as_u16(), &body, &self.name);
            if let Some(delay) = retry_after {
                err = err.retry_after(delay);
            }
            return Err(err);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, &self.name))?;
        let parsed: MessagesResponse = serde_json::from_str(&body).map_err(|e| {
            self.error(
                ProviderErrorKind::MalformedResponse,
                format!("Failed to parse response: {}", e),
            )
        })?;

        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();
        for block in &parsed.content {
            let Some(object) = block.as_object() else {
                continue;
            };
            match object.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(text) = object.get("text").and_then(Value::as_str) {
                        text_parts.push(text.to_string());
                    }
                }
                Some("tool_use") => tool_calls.push(tool_use_to_call(object)),
                _ => {}
            }
        }

        debug!(
            provider = %self.name,
            tool_calls = tool_calls.len(),
            stop_reason = parsed.stop_reason.as_deref().unwrap_or("-"),
            "Response received"
        );

        let text = text_parts.join("");
        Ok(ProviderResponse {
            tool_calls,
            text: (!text.trim().is_empty()).then_some(text),
            usage: parsed
                .usage
                .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens))
                .unwrap_or_default(),
            timing: ResponseTiming::from_duration(start_time.elapsed()),
            metadata: ResponseMetadata {
                model: self.model.clone(),
                provider: self.name.clone(),
            },
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    system: String,
    messages: Vec<RequestMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec>,
}

#[derive(Debug, Serialize)]
struct RequestMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ToolSpec {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<Value>,
    stop_reason: Option<String>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str) -> AnthropicProvider {
        AnthropicProvider::new(ProviderDescriptor {
            name: "anthropic".to_string(),
            base_url: base_url.to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            credential: Some(SecretString::from("sk-ant-test".to_string())),
            timeout: Duration::from_secs(5),
            temperature: 0.0,
            max_tokens: 1024,
        })
        .unwrap()
    }

    fn tools() -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "move_object".into(),
            description: "Move an object".into(),
            input_schema: json!({"type": "object"}),
        }]
    }

    #[tokio::test]
    async fn test_call_uses_native_tool_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({
                "tools": [{"name": "move_object", "input_schema": {"type": "object"}}],
                "messages": [{"role": "user", "content": "move obj-1 to 10, 20"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "text", "text": "Moving it."},
                    {"type": "tool_use", "id": "toolu_1", "name": "move_object", "input": {"objectId": "obj-1", "x": 10, "y": 20}}
                ],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 200, "output_tokens": 40}
            })))
            .mount(&server)
            .await;

        let response = provider(&server.uri())
            .call(&Command::new("move obj-1 to 10, 20", "c1"), &tools())
            .await
            .unwrap();

        assert_eq!(
            response.tool_calls,
            vec![json!({"id": "toolu_1", "name": "move_object", "input": {"objectId": "obj-1", "x": 10, "y": 20}})]
        );
        assert_eq!(response.text.as_deref(), Some("Moving it."));
        assert_eq!(response.usage.total(), 240);
        assert_eq!(response.metadata.provider, "anthropic");
    }

    #[tokio::test]
    async fn test_overloaded_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .call(&Command::new("x", "c1"), &tools())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Unavailable);
        assert!(err.should_fallback());
    }

    #[tokio::test]
    async fn test_missing_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg_1"})))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .call(&Command::new("x", "c1"), &tools())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::MalformedResponse);
    }
}
