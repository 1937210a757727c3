//! OpenAiProvider -- [`LlmProvider`] for the OpenAI Chat Completions API.
//!
//! Sends `POST {base}/chat/completions` with bearer auth. Messages and tool
//! definitions are already in OpenAI's shape; the response's first choice
//! is normalized into a [`ChatResponse`].

use std::sync::Arc;
use std::time::Duration;

use agentflow_core::llm::provider::LlmProvider;
use agentflow_types::llm::{ChatRequest, ChatResponse, LlmError, ToolCall};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use super::http::{client, send_json, token_count};
use super::pricing::PriceTable;

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI chat provider.
///
/// Does NOT derive Debug; the API key is only exposed when building the
/// Authorization header.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    pricing: Arc<PriceTable>,
}

impl OpenAiProvider {
    pub fn new(api_key: SecretString, timeout: Duration, pricing: Arc<PriceTable>) -> Self {
        Self {
            client: client(timeout),
            api_key,
            base_url: OPENAI_API_URL.to_string(),
            pricing,
        }
    }

    /// Override the base URL (proxies, compatible gateways, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Build the `/chat/completions` payload.
pub(crate) fn build_body(request: &ChatRequest, model: &str) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| json!({"role": m.role.to_string(), "content": m.content}))
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    });
    if !request.tools.is_empty() {
        body["tools"] = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description.clone().unwrap_or_default(),
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
    }
    body
}

/// Normalize a `/chat/completions` response.
pub(crate) fn parse_response(
    data: &Value,
    model: &str,
    pricing: &PriceTable,
) -> Result<ChatResponse, LlmError> {
    let message = data
        .pointer("/choices/0/message")
        .ok_or_else(|| LlmError::Deserialization("response has no choices".to_string()))?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|tc| {
                    let function = tc.get("function")?;
                    Some(ToolCall {
                        id: tc.get("id").and_then(Value::as_str).map(str::to_string),
                        name: function.get("name")?.as_str()?.to_string(),
                        arguments: parse_arguments(function.get("arguments")),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let usage = data.get("usage").cloned().unwrap_or(Value::Null);
    let input_tokens = token_count(&usage, "prompt_tokens");
    let output_tokens = token_count(&usage, "completion_tokens");

    Ok(ChatResponse {
        content,
        tool_calls,
        model: model.to_string(),
        provider: "openai".to_string(),
        input_tokens,
        output_tokens,
        cost: pricing.calculate_cost(model, input_tokens, output_tokens),
    })
}

/// Tool arguments arrive as a JSON-encoded string; keep the raw string if
/// it does not parse.
fn parse_arguments(raw: Option<&Value>) -> Value {
    match raw {
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
        Some(other) => other.clone(),
        None => Value::Object(Default::default()),
    }
}

impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        OPENAI_DEFAULT_MODEL
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let model = request.model.as_deref().unwrap_or(OPENAI_DEFAULT_MODEL);
        let body = build_body(request, model);

        let data = send_json(
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(self.api_key.expose_secret())
                .json(&body),
        )
        .await?;

        parse_response(&data, model, &self.pricing)
    }
}
