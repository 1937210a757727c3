//! GoogleProvider -- [`LlmProvider`] for the Gemini `generateContent` API.
//!
//! Sends `POST {base}/models/{model}:generateContent?key=...`. Assistant
//! messages use the `model` role, system messages become
//! `systemInstruction`, and tools are grouped into one
//! `function_declarations` entry.

use std::sync::Arc;
use std::time::Duration;

use agentflow_core::llm::provider::LlmProvider;
use agentflow_types::llm::{ChatRequest, ChatResponse, LlmError, MessageRole, ToolCall};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use super::http::{client, send_json, token_count};
use super::pricing::PriceTable;

pub const GOOGLE_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GOOGLE_DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Google Gemini chat provider.
///
/// Does NOT derive Debug; the API key is passed as a query parameter and is
/// never logged.
pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    pricing: Arc<PriceTable>,
}

impl GoogleProvider {
    pub fn new(api_key: SecretString, timeout: Duration, pricing: Arc<PriceTable>) -> Self {
        Self {
            client: client(timeout),
            api_key,
            base_url: GOOGLE_API_URL.to_string(),
            pricing,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

pub(crate) fn build_body(request: &ChatRequest) -> Value {
    let contents: Vec<Value> = request
        .conversation()
        .map(|m| {
            let role = match m.role {
                MessageRole::Assistant => "model",
                _ => "user",
            };
            json!({"role": role, "parts": [{"text": m.content}]})
        })
        .collect();

    let mut body = json!({
        "contents": contents,
        "generationConfig": {
            "temperature": request.temperature,
            "maxOutputTokens": request.max_tokens,
        },
    });
    if let Some(system) = request.system_prompt() {
        body["systemInstruction"] = json!({"parts": [{"text": system}]});
    }
    if !request.tools.is_empty() {
        let declarations: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description.clone().unwrap_or_default(),
                    "parameters": t.parameters,
                })
            })
            .collect();
        body["tools"] = json!([{"function_declarations": declarations}]);
    }
    body
}

pub(crate) fn parse_response(data: &Value, model: &str, pricing: &PriceTable) -> ChatResponse {
    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls = Vec::new();

    let parts = data
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array);
    for part in parts.into_iter().flatten() {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            text_parts.push(text);
        } else if let Some(call) = part.get("functionCall") {
            if let Some(name) = call.get("name").and_then(Value::as_str) {
                tool_calls.push(ToolCall {
                    // Gemini does not assign call ids; the function name stands in.
                    id: Some(name.to_string()),
                    name: name.to_string(),
                    arguments: call.get("args").cloned().unwrap_or(json!({})),
                });
            }
        }
    }

    let usage = data.get("usageMetadata").cloned().unwrap_or(Value::Null);
    let input_tokens = token_count(&usage, "promptTokenCount");
    let output_tokens = token_count(&usage, "candidatesTokenCount");

    ChatResponse {
        content: text_parts.join(""),
        tool_calls,
        model: model.to_string(),
        provider: "google".to_string(),
        input_tokens,
        output_tokens,
        cost: pricing.calculate_cost(model, input_tokens, output_tokens),
    }
}

impl LlmProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn default_model(&self) -> &str {
        GOOGLE_DEFAULT_MODEL
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let model = request.model.as_deref().unwrap_or(GOOGLE_DEFAULT_MODEL);
        let body = build_body(request);

        let data = send_json(
            self.client
                .post(format!("{}/models/{model}:generateContent", self.base_url))
                .query(&[("key", self.api_key.expose_secret())])
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
    fn test_roles_and_system_instruction() {
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
                description: None,
                parameters: json!({"type": "object"}),
            }],
            temperature: 0.5,
            max_tokens: 64,
        };
        let body = build_body(&request);

        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 64);
        assert_eq!(body["tools"][0]["function_declarations"][0]["name"], "lookup");
    }

    #[test]
    fn test_parse_candidate_parts() {
        let data = json!({
            "candidates": [{"content": {"parts": [
                {"text": "Sure"},
                {"functionCall": {"name": "lookup", "args": {"q": "rust"}}}
            ]}}],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 4}
        });
        let resp = parse_response(&data, GOOGLE_DEFAULT_MODEL, &PriceTable::default());
        assert_eq!(resp.content, "Sure");
        assert_eq!(resp.tool_calls[0].id.as_deref(), Some("lookup"));
        assert_eq!(resp.input_tokens, 10);
        assert_eq!(resp.output_tokens, 4);
        assert_eq!(resp.provider, "google");
    }

    #[test]
    fn test_parse_empty_candidates() {
        let resp = parse_response(&json!({}), GOOGLE_DEFAULT_MODEL, &PriceTable::default());
        assert_eq!(resp.content, "");
        assert!(resp.tool_calls.is_empty());
        assert_eq!(resp.cost, 0.0);
    }
}
