//! Engine configuration types for agentflow.
//!
//! `EngineConfig` represents the top-level `agentflow.toml` that controls
//! provider credentials, model routing, the default retry policy, HTTP
//! timeouts, and event channel sizing. Every field has a default, so an
//! empty file is a valid configuration.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub events: EventsConfig,

    /// Price overrides, consulted before the built-in price table.
    #[serde(default)]
    pub pricing: Vec<ModelPricing>,
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Credentials for the backing LLM providers.
///
/// Used both for the process-wide defaults and for per-organization
/// overrides. Keys are redacted from `Debug` output.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ollama_url: Option<String>,
}

impl ProvidersConfig {
    /// Field-wise overlay: values set in `overrides` win, the rest come from `self`.
    ///
    /// Empty strings count as unset.
    pub fn overlay(&self, overrides: &ProvidersConfig) -> ProvidersConfig {
        fn pick(over: &Option<String>, base: &Option<String>) -> Option<String> {
            over.as_ref()
                .filter(|v| !v.is_empty())
                .or(base.as_ref().filter(|v| !v.is_empty()))
                .cloned()
        }

        ProvidersConfig {
            openai_api_key: pick(&overrides.openai_api_key, &self.openai_api_key),
            anthropic_api_key: pick(&overrides.anthropic_api_key, &self.anthropic_api_key),
            google_api_key: pick(&overrides.google_api_key, &self.google_api_key),
            ollama_url: pick(&overrides.ollama_url, &self.ollama_url),
        }
    }

    /// Whether no provider is configured at all.
    pub fn is_empty(&self) -> bool {
        self.openai_api_key.is_none()
            && self.anthropic_api_key.is_none()
            && self.google_api_key.is_none()
            && self.ollama_url.is_none()
    }
}

impl fmt::Debug for ProvidersConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("ProvidersConfig")
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("google_api_key", &redact(&self.google_api_key))
            .field("ollama_url", &self.ollama_url)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// How model names map to providers, and which providers to fall back to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Model-name prefix (first hyphen-delimited token) to provider name.
    #[serde(default = "default_provider_map")]
    pub provider_map: BTreeMap<String, String>,

    /// Preferred fallback order. Providers without credentials are dropped
    /// when the router is built.
    #[serde(default = "default_fallback_order")]
    pub fallback_order: Vec<String>,
}

fn default_provider_map() -> BTreeMap<String, String> {
    [
        ("gpt", "openai"),
        ("o1", "openai"),
        ("o3", "openai"),
        ("claude", "anthropic"),
        ("gemini", "google"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_fallback_order() -> Vec<String> {
    ["openai", "anthropic", "google", "ollama"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            provider_map: default_provider_map(),
            fallback_order: default_fallback_order(),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry / HTTP / events
// ---------------------------------------------------------------------------

/// Default retry policy; graph-level settings override individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,

    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: f64,

    /// Error category names that are retried (matching includes ancestors).
    #[serde(default = "default_retryable")]
    pub retryable: Vec<String>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> f64 {
    2.0
}

fn default_backoff_max_secs() -> f64 {
    60.0
}

fn default_retryable() -> Vec<String> {
    vec!["timeout".to_string(), "connection".to_string()]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            backoff_max_secs: default_backoff_max_secs(),
            retryable: default_retryable(),
        }
    }
}

/// Per-call HTTP timeouts, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    #[serde(default = "default_ollama_timeout")]
    pub ollama_timeout_secs: u64,

    #[serde(default = "default_action_timeout")]
    pub action_timeout_secs: u64,
}

fn default_provider_timeout() -> u64 {
    60
}

fn default_ollama_timeout() -> u64 {
    120
}

fn default_action_timeout() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: default_provider_timeout(),
            ollama_timeout_secs: default_ollama_timeout(),
            action_timeout_secs: default_action_timeout(),
        }
    }
}

/// Event bus sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Price for one model, in USD per 1K tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub model: String,
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}
