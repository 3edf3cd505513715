//! OpenAI-compatible Provider
//!
//! Chat Completions API with function calling. Serves OpenAI itself and any
//! protocol-compatible endpoint reachable through `base_url`.
//!
//! Tool-call `arguments` arrive as embedded JSON strings; they are forwarded
//! untouched as `input` so the validator can tell a parse failure apart from
//! a missing field.

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

pub struct OpenAiProvider {
    name: String,
    /// Never exposed in logs or debug output
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("name", &self.name)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiProvider {
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

    fn build_request(&self, command: &Command, tools: &[ToolDefinition]) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: build_system_prompt(command, tools),
                },
                ChatMessage {
                    role: "user",
                    content: command.text.clone(),
                },
            ],
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            tool_choice: (!tools.is_empty()).then_some("auto"),
            tools: tools
                .iter()
                .map(|t| ToolSpec {
                    kind: "function",
                    function: FunctionSpec {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.input_schema.clone(),
                    },
                })
                .collect(),
        }
    }

    fn error(&self, kind: ProviderErrorKind, message: impl Into<String>) -> ProviderError {
        ProviderError::with_provider(kind, message, &self.name)
    }
}

/// `{id, function: {name, arguments}}` -> `{id, name, input}`.
///
/// Only fields that are present are copied.
fn normalize_tool_call(raw: Value) -> Value {
    let Value::Object(mut call) = raw else {
        return raw;
    };

    let mut normalized = Map::new();
    if let Some(id) = call.remove("id") {
        normalized.insert("id".to_string(), id);
    }
    if let Some(Value::Object(mut function)) = call.remove("function") {
        if let Some(name) = function.remove("name") {
            normalized.insert("name".to_string(), name);
        }
        if let Some(arguments) = function.remove("arguments") {
            normalized.insert("input".to_string(), arguments);
        }
    }
    Value::Object(normalized)
}

#[async_trait]
impl ProviderClient for OpenAiProvider {
    async fn call(
        &self,
        command: &Command,
        tools: &[ToolDefinition],
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| self.error(ProviderErrorKind::Auth, "No credential configured"))?;

        info!(provider = %self.name, model = %self.model, "Calling chat completions");

        let start_time = Instant::now();
        let request = self.build_request(command, tools);
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key.expose_secret()))
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
        let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            self.error(
                ProviderErrorKind::MalformedResponse,
                format!("Failed to parse response: {}", e),
            )
        })?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| self.error(ProviderErrorKind::MalformedResponse, "No choices in response"))?;

        let tool_calls: Vec<Value> = message.tool_calls.into_iter().map(normalize_tool_call).collect();
        debug!(provider = %self.name, tool_calls = tool_calls.len(), "Response received");

        Ok(ProviderResponse {
            tool_calls,
            text: message.content.filter(|c| !c.trim().is_empty()),
            usage: parsed
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
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
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ToolSpec {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionSpec,
}

#[derive(Debug, Serialize)]
struct FunctionSpec {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn descriptor(base_url: &str, key: Option<&str>) -> ProviderDescriptor {
        ProviderDescriptor {
            name: "openai".to_string(),
            base_url: base_url.to_string(),
            model: "gpt-4o-mini".to_string(),
            credential: key.map(|k| SecretString::from(k.to_string())),
            timeout: Duration::from_secs(5),
            temperature: 0.0,
            max_tokens: 512,
        }
    }

    fn tools() -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "create_shape".into(),
            description: "Create shapes".into(),
            input_schema: json!({"type": "object", "properties": {"shapeType": {"type": "string"}}}),
        }]
    }

    #[test]
    fn test_normalize_tool_call() {
        let raw = json!({
            "id": "call_1",
            "type": "function",
            "function": {"name": "create_shape", "arguments": "{\"shapeType\":\"rectangle\"}"}
        });
        assert_eq!(
            normalize_tool_call(raw),
            json!({"id": "call_1", "name": "create_shape", "input": "{\"shapeType\":\"rectangle\"}"})
        );

        // Missing pieces stay missing for the validator
        assert_eq!(normalize_tool_call(json!({"id": "x"})), json!({"id": "x"}));
        assert_eq!(normalize_tool_call(json!(7)), json!(7));
    }

    #[tokio::test]
    async fn test_call_sends_function_tools_and_parses_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "tool_choice": "auto",
                "tools": [{"type": "function", "function": {"name": "create_shape"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "create_shape", "arguments": "{\"shapeType\":\"rectangle\",\"count\":5}"}
                        }]
                    }
                }],
                "usage": {"prompt_tokens": 120, "completion_tokens": 30}
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(descriptor(&server.uri(), Some("sk-test"))).unwrap();
        let response = provider
            .call(&Command::new("create 5 rectangles", "c1"), &tools())
            .await
            .unwrap();

        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0]["name"], json!("create_shape"));
        assert!(response.tool_calls[0]["input"].is_string());
        assert_eq!(response.usage.total(), 150);
        assert!(response.text.is_none());
    }

    #[tokio::test]
    async fn test_status_codes_are_classified() {
        let cases = [
            (401, ProviderErrorKind::Auth),
            (429, ProviderErrorKind::RemoteRateLimited),
            (500, ProviderErrorKind::Unavailable),
            (504, ProviderErrorKind::Timeout),
        ];

        for (status, expected) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status).insert_header("retry-after", "7"))
                .mount(&server)
                .await;

            let provider = OpenAiProvider::new(descriptor(&server.uri(), Some("k"))).unwrap();
            let err = provider
                .call(&Command::new("x", "c1"), &tools())
                .await
                .unwrap_err();
            assert_eq!(err.kind, expected, "status {status}");
            assert_eq!(err.retry_after, Some(Duration::from_secs(7)));
        }
    }

    #[tokio::test]
    async fn test_garbage_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(descriptor(&server.uri(), Some("k"))).unwrap();
        let err = provider
            .call(&Command::new("x", "c1"), &tools())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": []}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let mut desc = descriptor(&server.uri(), Some("k"));
        desc.timeout = Duration::from_millis(50);
        let provider = OpenAiProvider::new(desc).unwrap();
        let err = provider
            .call(&Command::new("x", "c1"), &tools())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_missing_credential_never_sends() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(descriptor(&server.uri(), None)).unwrap();
        assert!(!provider.has_credential());
        let err = provider
            .call(&Command::new("x", "c1"), &tools())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Auth);
    }
}
