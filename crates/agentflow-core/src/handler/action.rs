//! Action nodes: calls to external systems.
//!
//! `action_type` selects the operation. Every request goes through the
//! shared [`HttpTransport`] with an explicit timeout (`config.timeout`
//! seconds, default 30). Missing credentials and non-ok API answers come
//! back as `{success: false, error}` so downstream logic can branch on
//! them; transport failures propagate and are subject to retry.

use std::sync::Arc;
use std::time::Duration;

use agentflow_types::graph::NodeKind;
use serde_json::{json, Map, Value};

use super::{HandlerError, HandlerFuture, HandlerInput, HandlerOutcome, NodeHandler, NodeOutput};
use crate::transport::{HttpBody, HttpRequest, HttpResponse, HttpTransport, ALLOWED_METHODS};

pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Non-JSON response bodies are cut to this many characters.
pub const MAX_TEXT_BODY_CHARS: usize = 4000;

pub const SLACK_API_BASE: &str = "https://slack.com/api";
pub const DEFAULT_EMAIL_API_BASE: &str = "https://api.resend.com";

pub struct ActionHandler {
    transport: Arc<dyn HttpTransport>,
    default_timeout: Duration,
}

impl ActionHandler {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            default_timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }

    /// Timeout for nodes whose config has no `timeout` of their own.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    fn timeout(&self, config: &Value) -> Duration {
        config
            .get("timeout")
            .and_then(Value::as_f64)
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(self.default_timeout)
    }

    async fn http_request(&self, input: &HandlerInput<'_>) -> Result<Value, HandlerError> {
        let config = input.config;
        let method = input.str_field("method").unwrap_or("GET").to_uppercase();
        if !ALLOWED_METHODS.contains(&method.as_str()) {
            return Ok(soft_failure(format!("Method '{method}' not allowed")));
        }
        let Some(url) = input.str_field("url").filter(|u| !u.is_empty()) else {
            return Ok(soft_failure("url is required"));
        };

        let mut request = HttpRequest::new(method, url, self.timeout(config));
        for (name, value) in string_map(config.get("headers")) {
            request = request.header(name, value);
        }
        if let Some(auth) = input
            .context
            .credentials("http_request")
            .and_then(|c| c.get("auth_header"))
            .and_then(Value::as_str)
        {
            if !request.has_header("authorization") {
                request = request.header("Authorization", auth);
            }
        }
        request.body = match config.get("body") {
            None | Some(Value::Null) => HttpBody::Empty,
            Some(Value::String(s)) if s.is_empty() => HttpBody::Empty,
            Some(Value::String(s)) => HttpBody::Text(s.clone()),
            Some(other) => HttpBody::Json(other.clone()),
        };

        let response = self.transport.send(request).await?;
        let parsed = response.json();

        let mut result = json!({
            "success": response.is_success(),
            "status_code": response.status,
            "headers": response.headers,
            "body": parsed.clone().unwrap_or_else(|| Value::String(truncated(&response.body))),
        });
        if let (Some(mapping), Some(body @ Value::Object(_))) =
            (config.get("response_mapping").and_then(Value::as_object), &parsed)
        {
            let mapped: Map<String, Value> = mapping
                .iter()
                .map(|(key, path)| {
                    let value = path
                        .as_str()
                        .map(|p| extract_path(body, p))
                        .unwrap_or(Value::Null);
                    (key.clone(), value)
                })
                .collect();
            result["mapped"] = Value::Object(mapped);
        }
        Ok(result)
    }

    async fn webhook(&self, input: &HandlerInput<'_>) -> Result<Value, HandlerError> {
        let config = input.config;
        let Some(url) = input.str_field("url").filter(|u| !u.is_empty()) else {
            return Ok(soft_failure("url is required"));
        };
        let payload = config
            .get("payload")
            .or_else(|| config.get("body"))
            .cloned()
            .unwrap_or_else(|| json!({}));

        let mut request = HttpRequest::new("POST", url, self.timeout(config)).json(payload);
        for (name, value) in string_map(config.get("headers")) {
            request = request.header(name, value);
        }
        if !request.has_header("content-type") {
            request = request.header("Content-Type", "application/json");
        }

        let response = self.transport.send(request).await?;
        Ok(json!({
            "success": response.is_success(),
            "status_code": response.status,
            "body": response_body(&response),
        }))
    }

    async fn slack_send_message(&self, input: &HandlerInput<'_>) -> Result<Value, HandlerError> {
        let Some(token) = slack_token(input) else {
            return Ok(soft_failure("Slack credentials not configured"));
        };
        let channel = input.str_field("channel").unwrap_or_default();
        let text = input.str_field("text").unwrap_or_default();
        if channel.is_empty() {
            return Ok(soft_failure("channel is required"));
        }

        let request = HttpRequest::new(
            "POST",
            format!("{SLACK_API_BASE}/chat.postMessage"),
            self.timeout(input.config),
        )
        .bearer(token)
        .json(json!({ "channel": channel, "text": text }));

        let data = match slack_call(self.transport.as_ref(), request).await? {
            Ok(data) => data,
            Err(failure) => return Ok(failure),
        };
        Ok(json!({
            "success": true,
            "channel": data.get("channel").cloned().unwrap_or(Value::Null),
            "ts": data.get("ts").cloned().unwrap_or(Value::Null),
            "message": text,
        }))
    }

    async fn slack_read_messages(&self, input: &HandlerInput<'_>) -> Result<Value, HandlerError> {
        let Some(token) = slack_token(input) else {
            return Ok(soft_failure("Slack credentials not configured"));
        };
        let channel = input.str_field("channel").unwrap_or_default();
        if channel.is_empty() {
            return Ok(soft_failure("channel is required"));
        }
        let limit = input
            .config
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(10);

        let request = HttpRequest::new(
            "GET",
            format!("{SLACK_API_BASE}/conversations.history"),
            self.timeout(input.config),
        )
        .bearer(token)
        .query("channel", channel)
        .query("limit", limit.to_string());

        let data = match slack_call(self.transport.as_ref(), request).await? {
            Ok(data) => data,
            Err(failure) => return Ok(failure),
        };
        let messages: Vec<Value> = data
            .get("messages")
            .and_then(Value::as_array)
            .map(|messages| {
                messages
                    .iter()
                    .map(|m| {
                        json!({
                            "user": m.get("user").cloned().unwrap_or(Value::Null),
                            "text": m.get("text").cloned().unwrap_or(Value::Null),
                            "ts": m.get("ts").cloned().unwrap_or(Value::Null),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(json!({ "success": true, "messages": messages }))
    }

    async fn slack_list_channels(&self, input: &HandlerInput<'_>) -> Result<Value, HandlerError> {
        let Some(token) = slack_token(input) else {
            return Ok(soft_failure("Slack credentials not configured"));
        };
        let request = HttpRequest::new(
            "GET",
            format!("{SLACK_API_BASE}/conversations.list"),
            self.timeout(input.config),
        )
        .bearer(token)
        .query("types", "public_channel")
        .query("limit", "100");

        let data = match slack_call(self.transport.as_ref(), request).await? {
            Ok(data) => data,
            Err(failure) => return Ok(failure),
        };
        let channels: Vec<Value> = data
            .get("channels")
            .and_then(Value::as_array)
            .map(|channels| {
                channels
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.get("id").cloned().unwrap_or(Value::Null),
                            "name": c.get("name").cloned().unwrap_or(Value::Null),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(json!({ "success": true, "channels": channels }))
    }

    async fn send_email(&self, input: &HandlerInput<'_>) -> Result<Value, HandlerError> {
        let Some(creds) = input.context.credentials("email") else {
            return Ok(soft_failure("Email credentials not configured"));
        };
        let (Some(api_key), Some(from)) = (
            creds.get("api_key").and_then(Value::as_str),
            creds.get("from").and_then(Value::as_str),
        ) else {
            return Ok(soft_failure("Email credentials must include api_key and from"));
        };
        let to = match input.config.get("to") {
            Some(Value::String(s)) if !s.is_empty() => vec![Value::String(s.clone())],
            Some(Value::Array(list)) if !list.is_empty() => list.clone(),
            _ => return Ok(soft_failure("to is required")),
        };
        let base = creds
            .get("base_url")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_EMAIL_API_BASE)
            .trim_end_matches('/');

        let mut body = json!({
            "from": from,
            "to": to,
            "subject": input.str_field("subject").unwrap_or_default(),
        });
        if let Some(html) = input.str_field("html") {
            body["html"] = Value::String(html.to_string());
        } else {
            body["text"] = Value::String(input.str_field("body").unwrap_or_default().to_string());
        }

        let request = HttpRequest::new("POST", format!("{base}/emails"), self.timeout(input.config))
            .bearer(api_key)
            .json(body);
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            return Ok(json!({
                "success": false,
                "status_code": response.status,
                "error": response_body(&response),
            }));
        }
        let id = response
            .json()
            .and_then(|v| v.get("id").cloned())
            .unwrap_or(Value::Null);
        Ok(json!({ "success": true, "status_code": response.status, "id": id }))
    }
}

impl NodeHandler for ActionHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    fn execute<'a>(&'a self, input: &'a HandlerInput<'a>) -> HandlerFuture<'a> {
        Box::pin(async move {
            let action_type = input.selector("action_type", "http_request");
            let data = match action_type.as_str() {
                "http_request" => self.http_request(input).await?,
                "webhook" => self.webhook(input).await?,
                "slack_send_message" => self.slack_send_message(input).await?,
                "slack_read_messages" => self.slack_read_messages(input).await?,
                "slack_list_channels" => self.slack_list_channels(input).await?,
                "send_email" => self.send_email(input).await?,
                other => {
                    return Err(HandlerError::validation(format!(
                        "unknown action type: {other}"
                    )));
                }
            };

            if data.get("success") == Some(&Value::Bool(false)) {
                tracing::info!(
                    node_id = %input.node.id,
                    action_type = %action_type,
                    error = ?data.get("error"),
                    "action returned a soft failure"
                );
            }
            Ok(HandlerOutcome::Completed(NodeOutput::data(data)))
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn soft_failure(error: impl Into<String>) -> Value {
    json!({ "success": false, "error": error.into() })
}

/// String-valued entries of a JSON object; other values are rendered as JSON.
fn string_map(value: Option<&Value>) -> Vec<(String, String)> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), v)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn truncated(text: &str) -> String {
    text.chars().take(MAX_TEXT_BODY_CHARS).collect()
}

fn response_body(response: &HttpResponse) -> Value {
    response
        .json()
        .unwrap_or_else(|| Value::String(truncated(&response.body)))
}

/// Dot-path lookup where numeric segments index into lists (`items.0.id`).
fn extract_path(data: &Value, path: &str) -> Value {
    let mut current = data;
    for part in path.split('.') {
        let next = match current {
            Value::Object(map) => map.get(part),
            Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn slack_token<'a>(input: &'a HandlerInput<'_>) -> Option<&'a str> {
    let creds = input.context.credentials("slack")?;
    creds
        .get("bot_token")
        .or_else(|| creds.get("access_token"))
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
}

/// Send a Slack Web API request. The inner `Err` is a ready-made soft
/// failure for non-ok answers.
async fn slack_call(
    transport: &dyn HttpTransport,
    request: HttpRequest,
) -> Result<Result<Value, Value>, HandlerError> {
    let response = transport.send(request).await?;
    let Some(data) = response.json() else {
        return Ok(Err(soft_failure(format!(
            "Slack returned a non-JSON response (HTTP {})",
            response.status
        ))));
    };
    if data.get("ok").and_then(Value::as_bool) != Some(true) {
        let error = data
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        return Ok(Err(soft_failure(error)));
    }
    Ok(Ok(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{run_handler, HandlerHarness, RecordingTransport};
    use crate::transport::TransportError;
    use agentflow_types::error::ErrorCategory;

    async fn run(
        transport: &RecordingTransport,
        harness: &HandlerHarness,
        config: Value,
    ) -> Result<Value, HandlerError> {
        let handler = ActionHandler::new(Arc::new(transport.clone()));
        match run_handler(&handler, harness, "action", None, config).await? {
            HandlerOutcome::Completed(output) => Ok(output.data),
            other => panic!("action should complete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_request_sends_resolved_request() {
        let transport = RecordingTransport::new().respond(200, r#"{"user": {"id": 9, "tags": ["a", "b"]}}"#);
        let harness = HandlerHarness::new(json!({"user_id": 9}))
            .credential("http_request", json!({"auth_header": "Token abc"}));

        let config = json!({
            "method": "post",
            "url": "https://api.example.com/users/{{trigger.data.user_id}}",
            "headers": {"X-Trace": "t-1"},
            "body": {"id": "{{trigger.data.user_id}}"},
            "timeout": 5,
            "response_mapping": {"uid": "user.id", "second_tag": "user.tags.1", "nope": "user.missing"}
        });
        let out = run(&transport, &harness, config).await.unwrap();

        assert_eq!(out["success"], true);
        assert_eq!(out["status_code"], 200);
        assert_eq!(out["body"]["user"]["id"], 9);
        assert_eq!(out["mapped"], json!({"uid": 9, "second_tag": "b", "nope": null}));

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, "POST");
        assert_eq!(sent.url, "https://api.example.com/users/9");
        assert_eq!(sent.headers["X-Trace"], "t-1");
        assert_eq!(sent.headers["Authorization"], "Token abc");
        assert_eq!(sent.body, HttpBody::Json(json!({"id": 9})));
        assert_eq!(sent.timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_http_request_defaults_and_text_body() {
        let long = "x".repeat(MAX_TEXT_BODY_CHARS + 50);
        let transport = RecordingTransport::new().respond(503, &long);
        let harness = HandlerHarness::new(json!({}));

        let out = run(&transport, &harness, json!({"url": "https://example.com"})).await.unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["status_code"], 503);
        assert_eq!(out["body"].as_str().unwrap().len(), MAX_TEXT_BODY_CHARS);
        assert!(out.get("mapped").is_none());

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, "GET");
        assert_eq!(sent.body, HttpBody::Empty);
        assert_eq!(sent.timeout, DEFAULT_ACTION_TIMEOUT);
    }

    #[tokio::test]
    async fn test_configured_default_timeout_applies_without_node_timeout() {
        let transport = RecordingTransport::new().respond(200, "ok");
        let harness = HandlerHarness::new(json!({}));
        let handler = ActionHandler::new(Arc::new(transport.clone()))
            .with_default_timeout(Duration::from_secs(7));

        run_handler(&handler, &harness, "action", None, json!({"url": "https://example.com"}))
            .await
            .unwrap();
        assert_eq!(transport.requests()[0].timeout, Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_disallowed_method_is_soft_failure() {
        let transport = RecordingTransport::new();
        let harness = HandlerHarness::new(json!({}));
        let out = run(&transport, &harness, json!({"method": "TRACE", "url": "https://x"}))
            .await
            .unwrap();
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().contains("TRACE"));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_posts_payload() {
        let transport = RecordingTransport::new().respond(202, "accepted");
        let harness = HandlerHarness::new(json!({"event": "signup"}));
        let config = json!({
            "action_type": "webhook",
            "url": "https://hooks.example.com/in",
            "payload": {"event": "{{trigger.data.event}}"}
        });
        let out = run(&transport, &harness, config).await.unwrap();
        assert_eq!(out, json!({"success": true, "status_code": 202, "body": "accepted"}));

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, "POST");
        assert_eq!(sent.headers["Content-Type"], "application/json");
        assert_eq!(sent.body, HttpBody::Json(json!({"event": "signup"})));
    }

    #[tokio::test]
    async fn test_node_authorization_header_wins_in_any_case() {
        let transport = RecordingTransport::new().respond(200, "{}");
        let harness = HandlerHarness::new(json!({}))
            .credential("http_request", json!({"auth_header": "Token org"}));

        let config = json!({
            "url": "https://api.example.com",
            "headers": {"authorization": "Bearer node"}
        });
        run(&transport, &harness, config).await.unwrap();

        let sent = &transport.requests()[0];
        assert_eq!(sent.headers.len(), 1);
        assert_eq!(sent.headers["authorization"], "Bearer node");
    }

    #[tokio::test]
    async fn test_webhook_keeps_caller_content_type() {
        let transport = RecordingTransport::new().respond(200, "ok");
        let harness = HandlerHarness::new(json!({}));
        let config = json!({
            "action_type": "webhook",
            "url": "https://hooks.example.com/in",
            "headers": {"content-type": "application/cloudevents+json"}
        });
        run(&transport, &harness, config).await.unwrap();

        let sent = &transport.requests()[0];
        assert_eq!(sent.headers.len(), 1);
        assert_eq!(sent.headers["content-type"], "application/cloudevents+json");
    }

    #[tokio::test]
    async fn test_slack_without_credentials_is_soft_failure() {
        let transport = RecordingTransport::new();
        let harness = HandlerHarness::new(json!({}));
        let out = run(
            &transport,
            &harness,
            json!({"action_type": "slack_send_message", "channel": "C1", "text": "hi"}),
        )
        .await
        .unwrap();
        assert_eq!(out, json!({"success": false, "error": "Slack credentials not configured"}));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_slack_send_message_success_and_api_error() {
        let transport = RecordingTransport::new()
            .respond(200, r#"{"ok": true, "channel": "C1", "ts": "171.01"}"#)
            .respond(200, r#"{"ok": false, "error": "channel_not_found"}"#);
        let harness = HandlerHarness::new(json!({})).credential("slack", json!({"bot_token": "xoxb-1"}));
        let config = json!({"action_type": "slack_send_message", "channel": "C1", "text": "deployed"});

        let out = run(&transport, &harness, config.clone()).await.unwrap();
        assert_eq!(
            out,
            json!({"success": true, "channel": "C1", "ts": "171.01", "message": "deployed"})
        );
        let out = run(&transport, &harness, config).await.unwrap();
        assert_eq!(out, json!({"success": false, "error": "channel_not_found"}));

        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "https://slack.com/api/chat.postMessage");
        assert_eq!(sent.headers["Authorization"], "Bearer xoxb-1");
    }

    #[tokio::test]
    async fn test_slack_read_and_list() {
        let transport = RecordingTransport::new()
            .respond(200, r#"{"ok": true, "messages": [{"user": "U1", "text": "hey", "ts": "1", "extra": 1}]}"#)
            .respond(200, r#"{"ok": true, "channels": [{"id": "C1", "name": "general", "is_private": false}]}"#);
        let harness = HandlerHarness::new(json!({})).credential("slack", json!({"access_token": "xoxp-2"}));

        let out = run(
            &transport,
            &harness,
            json!({"action_type": "slack_read_messages", "channel": "C1", "limit": 5}),
        )
        .await
        .unwrap();
        assert_eq!(out["messages"], json!([{"user": "U1", "text": "hey", "ts": "1"}]));

        let out = run(&transport, &harness, json!({"action_type": "slack_list_channels"}))
            .await
            .unwrap();
        assert_eq!(out["channels"], json!([{"id": "C1", "name": "general"}]));

        let requests = transport.requests();
        assert_eq!(requests[0].method, "GET");
        assert!(requests[0].query.contains(&("limit".to_string(), "5".to_string())));
        assert!(requests[1].query.contains(&("types".to_string(), "public_channel".to_string())));
    }

    #[tokio::test]
    async fn test_send_email_uses_mail_api() {
        let transport = RecordingTransport::new().respond(200, r#"{"id": "em_1"}"#);
        let harness = HandlerHarness::new(json!({})).credential(
            "email",
            json!({"api_key": "re_key", "from": "bot@example.com", "base_url": "https://mail.test/"}),
        );
        let config = json!({"action_type": "send_email", "to": "ops@example.com", "subject": "Hi", "body": "Done"});
        let out = run(&transport, &harness, config).await.unwrap();
        assert_eq!(out, json!({"success": true, "status_code": 200, "id": "em_1"}));

        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "https://mail.test/emails");
        assert_eq!(sent.headers["Authorization"], "Bearer re_key");
        assert_eq!(
            sent.body,
            HttpBody::Json(json!({"from": "bot@example.com", "to": ["ops@example.com"], "subject": "Hi", "text": "Done"}))
        );
    }

    #[tokio::test]
    async fn test_send_email_without_credentials_is_soft_failure() {
        let transport = RecordingTransport::new();
        let harness = HandlerHarness::new(json!({}));
        let out = run(&transport, &harness, json!({"action_type": "send_email", "to": "a@b.c"}))
            .await
            .unwrap();
        assert_eq!(out["success"], false);
    }

    #[tokio::test]
    async fn test_unknown_action_type_is_validation_error() {
        let transport = RecordingTransport::new();
        let harness = HandlerHarness::new(json!({}));
        let err = run(&transport, &harness, json!({"action_type": "fax"})).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[tokio::test]
    async fn test_transport_timeout_propagates_as_retryable() {
        let transport = RecordingTransport::new().fail(TransportError::Timeout("5s".into()));
        let harness = HandlerHarness::new(json!({}));
        let err = run(&transport, &harness, json!({"url": "https://slow.example.com"}))
            .await
            .unwrap_err();
        assert!(err.category().matches("timeout"));
    }
}
