//! Engine configuration loader for agentflow.
//!
//! Reads `agentflow.toml` and deserializes it into [`EngineConfig`], then
//! applies environment overrides. Falls back to defaults when the file is
//! missing or malformed.

use std::path::Path;

use agentflow_types::config::{EngineConfig, ProvidersConfig};

/// Load engine configuration from `path`, then apply environment overrides.
///
/// - If `path` is `None` or the file does not exist, starts from [`EngineConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and starts from the default.
/// - `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `GOOGLE_API_KEY`, `OLLAMA_URL` and
///   `AGENTFLOW_MAX_RETRIES` override the file when set.
pub async fn load_engine_config(path: Option<&Path>) -> EngineConfig {
    let mut config = match path {
        Some(path) => read_config_file(path).await,
        None => EngineConfig::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config
}

async fn read_config_file(path: &Path) -> EngineConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            EngineConfig::default()
        }
    }
}

/// Apply overrides from `lookup` (the process environment in production).
///
/// Empty values are ignored. An unparseable `AGENTFLOW_MAX_RETRIES` is
/// logged and ignored.
pub fn apply_env_overrides(config: &mut EngineConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(key) = get("OPENAI_API_KEY") {
        config.providers.openai_api_key = Some(key);
    }
    if let Some(key) = get("ANTHROPIC_API_KEY") {
        config.providers.anthropic_api_key = Some(key);
    }
    if let Some(key) = get("GOOGLE_API_KEY") {
        config.providers.google_api_key = Some(key);
    }
    if let Some(url) = get("OLLAMA_URL") {
        config.providers.ollama_url = Some(url);
    }
    if let Some(raw) = get("AGENTFLOW_MAX_RETRIES") {
        match raw.parse::<u32>() {
            Ok(max_retries) => config.retry.max_retries = max_retries,
            Err(err) => tracing::warn!(value = %raw, "ignoring AGENTFLOW_MAX_RETRIES: {err}"),
        }
    }
}

/// Resolve the credentials for one run.
///
/// Priority:
/// 1. Organization-level overrides (field by field; empty values count as unset)
/// 2. Process-wide `[providers]` from the engine config
pub fn resolve_provider_credentials(
    org_overrides: Option<&ProvidersConfig>,
    config: &EngineConfig,
) -> ProvidersConfig {
    match org_overrides {
        Some(overrides) => config.providers.overlay(overrides),
        None => config.providers.overlay(&ProvidersConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[tokio::test]
    async fn test_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = read_config_file(&tmp.path().join("agentflow.toml")).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn test_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("agentflow.toml");
        tokio::fs::write(
            &path,
            r#"
[retry]
max_retries = 1
retryable = ["transport"]

[http]
action_timeout_secs = 5
"#,
        )
        .await
        .unwrap();

        let config = read_config_file(&path).await;
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.retryable, vec!["transport"]);
        assert_eq!(config.http.action_timeout_secs, 5);
        assert_eq!(config.http.provider_timeout_secs, 60);
    }

    #[tokio::test]
    async fn test_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("agentflow.toml");
        tokio::fs::write(&path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = read_config_file(&path).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_env_overrides_win_over_file() {
        let mut config = EngineConfig::default();
        config.providers.openai_api_key = Some("from-file".into());

        apply_env_overrides(
            &mut config,
            env(&[
                ("OPENAI_API_KEY", "from-env"),
                ("OLLAMA_URL", "http://gpu:11434"),
                ("ANTHROPIC_API_KEY", ""),
                ("AGENTFLOW_MAX_RETRIES", "7"),
            ]),
        );

        assert_eq!(config.providers.openai_api_key.as_deref(), Some("from-env"));
        assert_eq!(config.providers.ollama_url.as_deref(), Some("http://gpu:11434"));
        assert!(config.providers.anthropic_api_key.is_none());
        assert_eq!(config.retry.max_retries, 7);
    }

    #[test]
    fn test_bad_max_retries_is_ignored() {
        let mut config = EngineConfig::default();
        apply_env_overrides(&mut config, env(&[("AGENTFLOW_MAX_RETRIES", "lots")]));
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_org_credentials_take_priority() {
        let mut config = EngineConfig::default();
        config.providers.openai_api_key = Some("global".into());
        config.providers.google_api_key = Some("global-google".into());

        let org = ProvidersConfig {
            openai_api_key: Some("org".into()),
            ..Default::default()
        };
        let resolved = resolve_provider_credentials(Some(&org), &config);
        assert_eq!(resolved.openai_api_key.as_deref(), Some("org"));
        assert_eq!(resolved.google_api_key.as_deref(), Some("global-google"));

        let global_only = resolve_provider_credentials(None, &config);
        assert_eq!(global_only.openai_api_key.as_deref(), Some("global"));
    }

    #[test]
    fn test_empty_global_keys_resolve_to_unset() {
        let mut config = EngineConfig::default();
        config.providers.anthropic_api_key = Some(String::new());
        let resolved = resolve_provider_credentials(None, &config);
        assert!(resolved.is_empty());
    }
}
