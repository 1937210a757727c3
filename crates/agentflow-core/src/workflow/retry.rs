//! Retry policy for node execution.
//!
//! A run carries one [`RetryPolicy`], derived from the engine's retry config
//! and overridden by the graph's settings. [`execute_with_retry`] attempts an
//! operation up to `max_retries + 1` times; only errors whose category (or an
//! ancestor category) is listed in `retryable` are retried. Backoff before
//! retry `n` (0-based) is `min(backoff_base ^ n, backoff_max)` seconds.
//!
//! An approval request is an `Ok` outcome, so it is never retried.

use std::future::Future;
use std::time::Duration;

use agentflow_types::config::RetryConfig;
use agentflow_types::graph::GraphSettings;

use crate::handler::HandlerError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: f64,
    pub backoff_max: Duration,
    /// Error category names that may be retried.
    pub retryable: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: config.backoff_base,
            backoff_max: secs(config.backoff_max_secs),
            retryable: config.retryable.clone(),
        }
    }

    /// The policy for one run: `defaults` with the graph's overrides applied.
    pub fn for_graph(defaults: &RetryPolicy, settings: &GraphSettings) -> Self {
        Self {
            max_retries: settings.max_retries.unwrap_or(defaults.max_retries),
            backoff_base: settings.backoff_base.unwrap_or(defaults.backoff_base),
            backoff_max: settings
                .backoff_max_secs
                .map(secs)
                .unwrap_or(defaults.backoff_max),
            retryable: settings
                .retryable
                .clone()
                .unwrap_or_else(|| defaults.retryable.clone()),
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.backoff_base.powi(exponent);
        if delay.is_finite() && delay >= 0.0 {
            Duration::from_secs_f64(delay).min(self.backoff_max)
        } else {
            self.backoff_max
        }
    }

    pub fn is_retryable(&self, error: &HandlerError) -> bool {
        let category = error.category();
        self.retryable.iter().any(|name| category.matches(name))
    }
}

fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

/// One failed attempt that was followed by a retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryNotice {
    /// 1-based number of the attempt that failed.
    pub attempt: u32,
    pub backoff: Duration,
    pub error: String,
}

/// A successful result plus how it was reached.
#[derive(Debug)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
    pub retries: Vec<RetryNotice>,
}

/// The error that ended the attempts, plus how many were made.
#[derive(Debug)]
pub struct RetryFailure {
    pub error: HandlerError,
    pub attempts: u32,
    pub retries: Vec<RetryNotice>,
}

/// Run `op` under `policy`. `op` receives the 0-based attempt number.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<Attempted<T>, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, HandlerError>>,
{
    let mut retries = Vec::new();
    let mut attempt = 0u32;

    loop {
        match op(attempt).await {
            Ok(value) => {
                return Ok(Attempted {
                    value,
                    attempts: attempt + 1,
                    retries,
                });
            }
            Err(error) => {
                if attempt >= policy.max_retries || !policy.is_retryable(&error) {
                    return Err(RetryFailure {
                        error,
                        attempts: attempt + 1,
                        retries,
                    });
                }

                let backoff = policy.backoff_for(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts = policy.max_retries + 1,
                    backoff_secs = backoff.as_secs_f64(),
                    category = %error.category(),
                    error = %error,
                    "attempt failed, retrying"
                );
                retries.push(RetryNotice {
                    attempt: attempt + 1,
                    backoff,
                    error: error.to_string(),
                });
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use agentflow_types::error::ErrorCategory;
    use agentflow_types::llm::LlmError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base: 2.0,
            backoff_max: Duration::from_secs(5),
            retryable: vec!["timeout".into(), "connection".into()],
        }
    }

    fn timeout() -> HandlerError {
        TransportError::Timeout("slow".into()).into()
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let p = policy(5);
        assert_eq!(p.backoff_for(0), Duration::from_secs(1));
        assert_eq!(p.backoff_for(1), Duration::from_secs(2));
        assert_eq!(p.backoff_for(2), Duration::from_secs(4));
        assert_eq!(p.backoff_for(3), Duration::from_secs(5));
        assert_eq!(p.backoff_for(1000), Duration::from_secs(5));
    }

    #[test]
    fn test_retryable_matches_category_or_ancestor() {
        let p = policy(3);
        assert!(p.is_retryable(&timeout()));
        assert!(p.is_retryable(&LlmError::Connection("refused".into()).into()));
        assert!(!p.is_retryable(&HandlerError::validation("bad")));
        assert!(!p.is_retryable(&LlmError::RateLimited { retry_after_ms: None }.into()));

        let broad = RetryPolicy {
            retryable: vec!["transport".into()],
            ..policy(3)
        };
        assert!(broad.is_retryable(&timeout()));
        assert!(!broad.is_retryable(&HandlerError::execution(ErrorCategory::Provider, "x")));
    }

    #[test]
    fn test_graph_settings_override_defaults() {
        let defaults = policy(3);
        let settings = GraphSettings {
            max_retries: Some(1),
            backoff_max_secs: Some(0.5),
            ..GraphSettings::default()
        };
        let p = RetryPolicy::for_graph(&defaults, &settings);
        assert_eq!(p.max_retries, 1);
        assert_eq!(p.backoff_base, 2.0);
        assert_eq!(p.backoff_max, Duration::from_millis(500));
        assert_eq!(p.retryable, defaults.retryable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let started = tokio::time::Instant::now();

        let result = execute_with_retry(&policy(3), |_| async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(timeout())
            } else {
                Ok("done")
            }
        })
        .await
        .unwrap();

        assert_eq!(result.value, "done");
        assert_eq!(result.attempts, 3);
        assert_eq!(result.retries.len(), 2);
        assert_eq!(result.retries[1].backoff, Duration::from_secs(2));
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_retries_plus_one() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let failure = execute_with_retry(&policy(2), |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(timeout())
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.retries.len(), 2);
        assert!(failure.error.category().matches("timeout"));
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let failure = execute_with_retry(&policy(3), |_| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(HandlerError::validation("unknown operator"))
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(failure.attempts, 1);
        assert!(failure.retries.is_empty());
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let failure = execute_with_retry(&RetryPolicy::none(), |_| async move {
            Err::<(), _>(timeout())
        })
        .await
        .unwrap_err();
        assert_eq!(failure.attempts, 1);
    }
}
