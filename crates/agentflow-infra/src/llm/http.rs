//! Shared HTTP plumbing for the chat providers.
//!
//! Every provider speaks JSON over reqwest and maps failures the same way:
//! 401 is an authentication failure, 429 is a rate limit, any other non-2xx
//! status is an HTTP error carrying the body, and reqwest timeout/connect
//! failures keep their retryable categories.

use std::time::Duration;

use agentflow_types::llm::LlmError;
use reqwest::header::RETRY_AFTER;
use serde_json::Value;

/// Build a client with a fixed per-request timeout.
pub(crate) fn client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("failed to create reqwest client")
}

/// Map a reqwest send/read failure onto the provider error taxonomy.
pub(crate) fn map_send_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout(err.to_string())
    } else if err.is_connect() {
        LlmError::Connection(err.to_string())
    } else {
        LlmError::Provider {
            message: format!("HTTP request failed: {err}"),
        }
    }
}

/// Turn a non-2xx response into an error; pass a successful one through.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_ms = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs * 1000);
    let body = response.text().await.unwrap_or_default();

    Err(status_error(status.as_u16(), body, retry_after_ms))
}

pub(crate) fn status_error(status: u16, body: String, retry_after_ms: Option<u64>) -> LlmError {
    match status {
        401 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited { retry_after_ms },
        _ => LlmError::Http { status, body },
    }
}

/// Send a prepared request and parse the JSON body.
pub(crate) async fn send_json(request: reqwest::RequestBuilder) -> Result<Value, LlmError> {
    let response = request.send().await.map_err(map_send_error)?;
    let response = check_status(response).await?;
    response
        .json::<Value>()
        .await
        .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))
}

/// Read a token count that may be missing or null.
pub(crate) fn token_count(value: &Value, key: &str) -> u32 {
    value
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}
