//! OllamaProvider -- [`LlmProvider`] for a local Ollama server.
//!
//! Sends `POST {base}/api/chat` with `stream: false`. Local models carry no
//! cost; token counts come from `prompt_eval_count` / `eval_count`.

use std::time::Duration;

use agentflow_core::llm::provider::LlmProvider;
use agentflow_types::llm::{ChatRequest, ChatResponse, LlmError, ToolCall};
use serde_json::{json, Value};

use super::http::{client, send_json, token_count};
use super::openai;

pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
pub const OLLAMA_DEFAULT_MODEL: &str = "llama3";

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: client(timeout),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

pub(crate) fn build_body(request: &ChatRequest, model: &str) -> Value {
    // Messages and tools use the OpenAI shape; only the options differ.
    let openai_body = openai::build_body(request, model);
    let mut body = json!({
        "model": model,
        "messages": openai_body["messages"],
        "stream": false,
        "options": {
            "temperature": request.temperature,
            "num_predict": request.max_tokens,
        },
    });
    if let Some(tools) = openai_body.get("tools") {
        body["tools"] = tools.clone();
    }
    body
}

pub(crate) fn parse_response(data: &Value, model: &str) -> ChatResponse {
    let message = data.get("message").cloned().unwrap_or(Value::Null);
    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|tc| {
                    let function = tc.get("function")?;
                    let name = function.get("name")?.as_str()?.to_string();
                    Some(ToolCall {
                        id: Some(name.clone()),
                        name,
                        arguments: function.get("arguments").cloned().unwrap_or(json!({})),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    ChatResponse {
        content: message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        tool_calls,
        model: model.to_string(),
        provider: "ollama".to_string(),
        input_tokens: token_count(data, "prompt_eval_count"),
        output_tokens: token_count(data, "eval_count"),
        cost: 0.0,
    }
}

impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        OLLAMA_DEFAULT_MODEL
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let model = request.model.as_deref().unwrap_or(OLLAMA_DEFAULT_MODEL);
        let body = build_body(request, model);

        let data = send_json(
            self.client
                .post(format!("{}/api/chat", self.base_url))
                .json(&body),
        )
        .await?;

        Ok(parse_response(&data, model))
    }
}
