//! AI nodes: one chat completion through the provider router.
//!
//! The message list comes from `config.messages` (`[{role, content}]`) or,
//! when absent, from `system_prompt` + `prompt`. Template resolution has
//! already happened by the time the handler sees the config.

use agentflow_types::graph::NodeKind;
use agentflow_types::llm::{ChatMessage, ChatRequest, MessageRole, ToolDefinition};
use serde_json::{json, Value};
use tracing::field::Empty;
use tracing::{info_span, Instrument};

use super::{HandlerError, HandlerFuture, HandlerInput, HandlerOutcome, NodeHandler, NodeOutput};

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AiHandler;

impl NodeHandler for AiHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::Ai
    }

    fn execute<'a>(&'a self, input: &'a HandlerInput<'a>) -> HandlerFuture<'a> {
        Box::pin(async move {
            let request = build_request(input.config)?;
            let model = request.model.clone().unwrap_or_default();

            let span = info_span!(
                "gen_ai.chat",
                gen_ai.operation.name = "chat",
                gen_ai.request.model = %model,
                gen_ai.request.max_tokens = request.max_tokens,
                gen_ai.request.temperature = request.temperature,
                gen_ai.provider.name = Empty,
                gen_ai.response.model = Empty,
                gen_ai.usage.input_tokens = Empty,
                gen_ai.usage.output_tokens = Empty,
                agentflow.cost_usd = Empty,
                agentflow.node.id = %input.node.id,
            );
            let response = input
                .router
                .chat(&request)
                .instrument(span.clone())
                .await?;
            span.record("gen_ai.provider.name", response.provider.as_str());
            span.record("gen_ai.response.model", response.model.as_str());
            span.record("gen_ai.usage.input_tokens", response.input_tokens);
            span.record("gen_ai.usage.output_tokens", response.output_tokens);
            span.record("agentflow.cost_usd", response.cost);

            tracing::debug!(
                node_id = %input.node.id,
                provider = %response.provider,
                model = %response.model,
                input_tokens = response.input_tokens,
                output_tokens = response.output_tokens,
                "ai node completed"
            );

            Ok(HandlerOutcome::Completed(NodeOutput {
                data: json!({
                    "text": response.content,
                    "tool_calls": response.tool_calls,
                }),
                tokens_used: response.total_tokens(),
                cost: response.cost,
                model: Some(response.model),
            }))
        })
    }
}

/// Translate node config into a provider-neutral chat request.
fn build_request(config: &Value) -> Result<ChatRequest, HandlerError> {
    let messages = match config.get("messages").and_then(Value::as_array) {
        Some(entries) if !entries.is_empty() => entries
            .iter()
            .map(parse_message)
            .collect::<Result<Vec<_>, _>>()?,
        _ => {
            let mut messages = Vec::new();
            if let Some(system) = non_empty_str(config, "system_prompt") {
                messages.push(ChatMessage::system(system));
            }
            if let Some(prompt) = non_empty_str(config, "prompt") {
                messages.push(ChatMessage::user(prompt));
            }
            messages
        }
    };

    if messages.is_empty() {
        return Err(HandlerError::validation(
            "ai node needs `messages` or a `prompt`",
        ));
    }

    let tools = config
        .get("tools")
        .and_then(Value::as_array)
        .map(|tools| tools.iter().filter_map(ToolDefinition::from_config).collect())
        .unwrap_or_default();

    let model = non_empty_str(config, "model").unwrap_or(DEFAULT_MODEL);

    Ok(ChatRequest {
        messages,
        model: Some(model.to_string()),
        tools,
        temperature: config
            .get("temperature")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_TEMPERATURE),
        max_tokens: config
            .get("max_tokens")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(DEFAULT_MAX_TOKENS),
    })
}

fn parse_message(entry: &Value) -> Result<ChatMessage, HandlerError> {
    let role = entry
        .get("role")
        .and_then(Value::as_str)
        .unwrap_or("user")
        .parse::<MessageRole>()
        .map_err(HandlerError::Validation)?;
    let content = match entry.get("content") {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => String::new(),
        Some(other) => other.to_string(),
    };
    Ok(ChatMessage { role, content })
}

fn non_empty_str<'v>(config: &'v Value, key: &str) -> Option<&'v str> {
    config
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{run_handler, HandlerHarness, ScriptedProvider};
    use agentflow_types::error::ErrorCategory;
    use agentflow_types::llm::LlmError;

    #[tokio::test]
    async fn test_messages_are_sent_with_resolved_content() {
        let openai = ScriptedProvider::new("openai").reply("Summary: fine");
        let mut harness = HandlerHarness::with_providers(json!({"ticket": "printer on fire"}), vec![&openai]);
        harness.context.set_output("classify", json!({"text": "urgent"}));

        let config = json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "system", "content": "You triage tickets."},
                {"role": "user", "content": "{{classify.output.text}}: {{trigger.data.ticket}}"}
            ],
            "temperature": 0.2,
            "max_tokens": 256
        });
        let outcome = run_handler(&AiHandler, &harness, "ai", None, config).await.unwrap();

        let HandlerOutcome::Completed(output) = outcome else {
            panic!("ai should complete");
        };
        assert_eq!(output.data["text"], "Summary: fine");
        assert_eq!(output.data["tool_calls"], json!([]));
        assert_eq!(output.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(output.tokens_used, 15);

        let sent = &openai.calls()[0];
        assert_eq!(sent.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(sent.messages[1].content, "urgent: printer on fire");
        assert_eq!(sent.temperature, 0.2);
        assert_eq!(sent.max_tokens, 256);
    }

    #[tokio::test]
    async fn test_prompt_fallback_and_defaults() {
        let openai = ScriptedProvider::new("openai").reply("ok");
        let harness = HandlerHarness::with_providers(json!({}), vec![&openai]);

        let config = json!({"system_prompt": "be terse", "prompt": "hello"});
        run_handler(&AiHandler, &harness, "ai", None, config).await.unwrap();

        let sent = &openai.calls()[0];
        assert_eq!(sent.model.as_deref(), Some(DEFAULT_MODEL));
        assert_eq!(sent.system_prompt().as_deref(), Some("be terse"));
        assert_eq!(sent.messages.len(), 2);
        assert_eq!(sent.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(sent.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[tokio::test]
    async fn test_tools_are_parsed_from_config() {
        let openai = ScriptedProvider::new("openai").reply("ok");
        let harness = HandlerHarness::with_providers(json!({}), vec![&openai]);

        let config = json!({
            "prompt": "what's the weather",
            "tools": [
                {"type": "function", "function": {"name": "get_weather", "parameters": {"type": "object"}}},
                {"name": "lookup"},
                "not a tool"
            ]
        });
        run_handler(&AiHandler, &harness, "ai", None, config).await.unwrap();

        let names: Vec<_> = openai.calls()[0].tools.iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["get_weather", "lookup"]);
    }

    #[tokio::test]
    async fn test_missing_prompt_is_validation_error() {
        let harness = HandlerHarness::new(json!({}));
        let err = run_handler(&AiHandler, &harness, "ai", None, json!({"model": "gpt-4o"}))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces_as_llm_error() {
        let openai = ScriptedProvider::new("openai").fail(LlmError::Timeout("slow".into()));
        let harness = HandlerHarness::with_providers(json!({}), vec![&openai]);
        let err = run_handler(&AiHandler, &harness, "ai", None, json!({"prompt": "hi"}))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Llm(LlmError::AllProvidersFailed { .. })));
        assert_eq!(err.category(), ErrorCategory::Provider);
    }
}
