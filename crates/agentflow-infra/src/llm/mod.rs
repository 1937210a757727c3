//! LLM provider implementations.
//!
//! Concrete implementations of the [`LlmProvider`] trait defined in
//! `agentflow-core`, one per backing service, plus
//! [`build_provider_router`] which assembles a [`ProviderRouter`] from
//! resolved credentials.
//!
//! [`LlmProvider`]: agentflow_core::llm::provider::LlmProvider

pub mod anthropic;
pub mod google;
pub(crate) mod http;
pub mod ollama;
pub mod openai;
pub mod pricing;

use std::sync::Arc;
use std::time::Duration;

use agentflow_core::llm::box_provider::BoxLlmProvider;
use agentflow_core::llm::router::ProviderRouter;
use agentflow_types::config::{EngineConfig, ProvidersConfig};
use secrecy::SecretString;

use self::anthropic::AnthropicProvider;
use self::google::GoogleProvider;
use self::ollama::{OllamaProvider, OLLAMA_DEFAULT_URL};
use self::openai::OpenAiProvider;
use self::pricing::PriceTable;

/// Build one provider per configured credential, in the order openai,
/// anthropic, google, ollama. With nothing configured, a local Ollama at
/// the default URL is used.
pub fn build_providers(credentials: &ProvidersConfig, config: &EngineConfig) -> Vec<BoxLlmProvider> {
    let pricing = Arc::new(PriceTable::new(config.pricing.clone()));
    let timeout = Duration::from_secs(config.http.provider_timeout_secs);
    let ollama_timeout = Duration::from_secs(config.http.ollama_timeout_secs);

    let mut providers = Vec::new();

    if let Some(key) = non_empty(&credentials.openai_api_key) {
        providers.push(BoxLlmProvider::new(OpenAiProvider::new(
            SecretString::from(key.to_string()),
            timeout,
            Arc::clone(&pricing),
        )));
    }
    if let Some(key) = non_empty(&credentials.anthropic_api_key) {
        providers.push(BoxLlmProvider::new(AnthropicProvider::new(
            SecretString::from(key.to_string()),
            timeout,
            Arc::clone(&pricing),
        )));
    }
    if let Some(key) = non_empty(&credentials.google_api_key) {
        providers.push(BoxLlmProvider::new(GoogleProvider::new(
            SecretString::from(key.to_string()),
            timeout,
            Arc::clone(&pricing),
        )));
    }
    if let Some(url) = non_empty(&credentials.ollama_url) {
        providers.push(BoxLlmProvider::new(OllamaProvider::new(url, ollama_timeout)));
    }

    if providers.is_empty() {
        tracing::info!("no LLM credentials configured, using local Ollama");
        providers.push(BoxLlmProvider::new(OllamaProvider::new(
            OLLAMA_DEFAULT_URL,
            ollama_timeout,
        )));
    }

    providers
}

/// Build the router for one run from resolved credentials.
pub fn build_provider_router(credentials: &ProvidersConfig, config: &EngineConfig) -> ProviderRouter {
    let providers = build_providers(credentials, config);
    tracing::debug!(
        providers = ?providers.iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
        "provider router built"
    );
    ProviderRouter::new(
        providers,
        &config.routing.fallback_order,
        config.routing.provider_map.clone(),
    )
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(providers: &[BoxLlmProvider]) -> Vec<&str> {
        providers.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn test_one_provider_per_key_in_fixed_order() {
        let credentials = ProvidersConfig {
            google_api_key: Some("g".into()),
            openai_api_key: Some("o".into()),
            ollama_url: Some("http://localhost:11434".into()),
            ..Default::default()
        };
        let providers = build_providers(&credentials, &EngineConfig::default());
        assert_eq!(names(&providers), vec!["openai", "google", "ollama"]);
    }

    #[test]
    fn test_empty_keys_are_ignored() {
        let credentials = ProvidersConfig {
            anthropic_api_key: Some(String::new()),
            ..Default::default()
        };
        let providers = build_providers(&credentials, &EngineConfig::default());
        assert_eq!(names(&providers), vec!["ollama"]);
    }

    #[test]
    fn test_router_resolves_configured_provider() {
        let credentials = ProvidersConfig {
            anthropic_api_key: Some("sk-ant".into()),
            ..Default::default()
        };
        let router = build_provider_router(&credentials, &EngineConfig::default());
        assert_eq!(router.resolve("claude-sonnet-4-5-20250929").unwrap(), "anthropic");
        // Unmapped model falls back to the first configured provider.
        assert_eq!(router.resolve("mystery-model").unwrap(), "anthropic");
    }
}
