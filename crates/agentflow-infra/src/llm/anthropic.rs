//! AnthropicProvider -- [`LlmProvider`] for the Anthropic Messages API.
//!
//! Sends `POST {base}/v1/messages` with `x-api-key` and `anthropic-version`
//! headers. System messages are lifted into the top-level `system` field
//! and tool definitions are converted to `{name, description, input_schema}`.
//! Text blocks are joined with newlines; `tool_use` blocks become tool calls.

use std::sync::Arc;
use std::time::Duration;

use agentflow_core::llm::provider::LlmProvider;
use agentflow_types::llm::{ChatRequest, ChatResponse, LlmError, MessageRole, ToolCall};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use super::http::{client, send_json, token_count};
use super::pricing::PriceTable;

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Anthropic Claude chat provider.
///
/// Does NOT derive Debug; the API key lives in a [`SecretString`].
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    pricing: Arc<PriceTable>,
}

impl AnthropicProvider {
    /// The Anthropic API version header value.
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(api_key: SecretString, timeout: Duration, pricing: Arc<PriceTable>) -> Self {
        Self {
            client: client(timeout),
            api_key,
            base_url: ANTHROPIC_API_URL.to_string(),
            pricing,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

pub(crate) fn build_body(request: &ChatRequest, model: &str) -> Value {
    let messages: Vec<Value> = request
        .conversation()
        .map(|m| {
            let role = match m.role {
                MessageRole::Assistant => "assistant",
                _ => "user",
            };
            json!({"role": role, "content": m.content})
        })
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
    });
    if let Some(system) = request.system_prompt() {
        body["system"] = Value::String(system);
    }
    if !request.tools.is_empty() {
        body["tools"] = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description.clone().unwrap_or_default(),
                    "input_schema": t.parameters,
                })
            })
            .collect();
    }
    body
}

pub(crate) fn parse_response(data: &Value, model: &str, pricing: &PriceTable) -> ChatResponse {
    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls = Vec::new();

    for block in data.get("content").and_then(Value::as_array).into_iter().flatten() {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    text_parts.push(text);
                }
            }
            Some("tool_use") => {
                if let Some(name) = block.get("name").and_then(Value::as_str) {
                    tool_calls.push(ToolCall {
                        id: block.get("id").and_then(Value::as_str).map(str::to_string),
                        name: name.to_string(),
                        arguments: block.get("input").cloned().unwrap_or(json!({})),
                    });
                }
            }
            _ => {}
        }
    }

    let usage = data.get("usage").cloned().unwrap_or(Value::Null);
    let input_tokens = token_count(&usage, "input_tokens");
    let output_tokens = token_count(&usage, "output_tokens");

    ChatResponse {
        content: text_parts.join("\n"),
        tool_calls,
        model: model.to_string(),
        provider: "anthropic".to_string(),
        input_tokens,
        output_tokens,
        cost: pricing.calculate_cost(model, input_tokens, output_tokens),
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        ANTHROPIC_DEFAULT_MODEL
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let model = request.model.as_deref().unwrap_or(ANTHROPIC_DEFAULT_MODEL);
        let body = build_body(request, model);

        let data = send_json(
            self.client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", Self::API_VERSION)
                .json(&body),
        )
        .await?;

        Ok(parse_response(&data, model, &self.pricing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_types::llm::{ChatMessage, ToolDefinition};

    #[test]
    fn test_system_is_lifted_out_of_messages() {
        let request = ChatRequest {
            messages: vec![
                ChatMessage::system("be brief"),
                ChatMessage::user("hi"),
                ChatMessage {
                    role: MessageRole::Assistant,
                    content: "hello".into(),
                },
            ],
            model: None,
            tools: vec![ToolDefinition {
                name: "lookup".into(),
                description: Some("Find".into()),
                parameters: json!({"type": "object"}),
            }],
            temperature: 0.7,
            max_tokens: 256,
        };
        let body = build_body(&request, ANTHROPIC_DEFAULT_MODEL);

        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["tools"][0]["description"], "Find");
    }

    #[test]
    fn test_no_system_field_without_system_message() {
        let request = ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            model: None,
            tools: vec![],
            temperature: 0.7,
            max_tokens: 256,
        };
        let body = build_body(&request, "claude-haiku-4-5-20251001");
        assert!(body.get("system").is_none());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_parse_text_and_tool_use_blocks() {
        let data = json!({
            "content": [
                {"type": "text", "text": "Looking that up."},
                {"type": "tool_use", "id": "toolu_1", "name": "lookup", "input": {"q": "rust"}},
                {"type": "text", "text": "Done."}
            ],
            "usage": {"input_tokens": 1000, "output_tokens": 1000}
        });
        let resp = parse_response(&data, ANTHROPIC_DEFAULT_MODEL, &PriceTable::default());
        assert_eq!(resp.content, "Looking that up.\nDone.");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].arguments["q"], "rust");
        assert!((resp.cost - 0.018).abs() < 1e-12);
    }
}
