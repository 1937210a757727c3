//! Model-prefix routing with ordered provider fallback.
//!
//! A router is built fresh for each run from resolved credentials and holds
//! one provider per configured name. A model name's first hyphen-delimited
//! token picks the provider (`claude-sonnet-4-5` -> `claude` -> anthropic);
//! unmapped or unavailable models go to the first provider in the fallback
//! order. When the chosen provider fails, every other provider in the
//! fallback order is tried in turn. This is the only place provider errors
//! are caught and retried without surfacing.

use std::collections::{BTreeMap, HashMap};

use agentflow_types::llm::{ChatRequest, ChatResponse, LlmError, ProviderAttempt};

use super::box_provider::BoxLlmProvider;

pub struct ProviderRouter {
    providers: HashMap<String, BoxLlmProvider>,
    fallback_order: Vec<String>,
    provider_map: BTreeMap<String, String>,
}

impl ProviderRouter {
    /// Build a router.
    ///
    /// `fallback_order` is filtered down to the providers actually supplied;
    /// supplied providers missing from it are appended in the given order.
    pub fn new(
        providers: Vec<BoxLlmProvider>,
        fallback_order: &[String],
        provider_map: BTreeMap<String, String>,
    ) -> Self {
        let names: Vec<String> = providers.iter().map(|p| p.name().to_string()).collect();

        let mut order: Vec<String> = fallback_order
            .iter()
            .filter(|name| names.contains(name))
            .cloned()
            .collect();
        for name in &names {
            if !order.contains(name) {
                order.push(name.clone());
            }
        }

        let providers = providers
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect();

        Self {
            providers,
            fallback_order: order,
            provider_map,
        }
    }

    pub fn fallback_order(&self) -> &[String] {
        &self.fallback_order
    }

    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.fallback_order.iter().map(String::as_str)
    }

    /// Name of the provider that handles `model` first.
    pub fn resolve(&self, model: &str) -> Result<&str, LlmError> {
        let prefix = model.split('-').next().unwrap_or(model);
        if let Some(name) = self.provider_map.get(prefix) {
            if self.providers.contains_key(name) {
                return Ok(name.as_str());
            }
        }
        self.fallback_order
            .first()
            .map(String::as_str)
            .ok_or_else(|| LlmError::NoProvider(model.to_string()))
    }

    /// Send `request` to the resolved provider, falling back on any error.
    ///
    /// Fallback attempts drop the model name so each fallback provider uses
    /// its own default model.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let model = request.model.as_deref().unwrap_or_default();
        let primary = self.resolve(model)?.to_string();
        let mut attempts = Vec::new();

        if let Some(provider) = self.providers.get(&primary) {
            match provider.chat(request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    tracing::warn!(
                        provider = %primary,
                        model,
                        error = %err,
                        "primary provider failed, trying fallbacks"
                    );
                    attempts.push(ProviderAttempt {
                        provider: primary.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        let fallback_request = ChatRequest {
            model: None,
            ..request.clone()
        };

        for name in self.fallback_order.iter().filter(|n| **n != primary) {
            let Some(provider) = self.providers.get(name) else {
                continue;
            };
            match provider.chat(&fallback_request).await {
                Ok(response) => {
                    tracing::info!(
                        provider = %name,
                        requested_model = model,
                        "request served by fallback provider"
                    );
                    return Ok(response);
                }
                Err(err) => {
                    tracing::warn!(provider = %name, error = %err, "fallback provider also failed");
                    attempts.push(ProviderAttempt {
                        provider: name.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        Err(LlmError::AllProvidersFailed { attempts })
    }
}

impl std::fmt::Debug for ProviderRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRouter")
            .field("fallback_order", &self.fallback_order)
            .field("provider_map", &self.provider_map)
            .finish()
    }
}
