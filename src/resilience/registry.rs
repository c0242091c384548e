//! Model Registry
//!
//! Read-only view of the configured models: each model's fallback chain
//! and the retry policy to use for each RECOVERABLE failure kind.

use std::collections::HashMap;

use crate::config::{Config, RetryOverrides};
use crate::types::ProviderErrorKind;

use super::retry::RetryPolicy;

/// Retry policies by failure family
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicies {
    pub default: RetryPolicy,
    pub rate_limit: RetryPolicy,
    pub network: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            default: RetryPolicy::default(),
            rate_limit: RetryPolicy::rate_limit(),
            network: RetryPolicy::network(),
        }
    }
}

impl RetryPolicies {
    /// Policy for a failure kind, with per-model overrides applied
    fn select(&self, kind: ProviderErrorKind, overrides: Option<&RetryOverrides>) -> RetryPolicy {
        let overrides = overrides.cloned().unwrap_or_default();
        match kind {
            ProviderErrorKind::RateLimit => overrides.rate_limit.unwrap_or(self.rate_limit),
            kind if kind.is_network() => overrides.network.unwrap_or(self.network),
            _ => overrides.default.unwrap_or(self.default),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ModelEntry {
    fallback_chain: Vec<String>,
    retry: RetryOverrides,
}

/// Fallback chains and retry policies keyed by model id
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelEntry>,
    policies: RetryPolicies,
}

impl ModelRegistry {
    /// Empty registry with the built-in retry policies
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        let resilience = &config.resilience;
        let policies = RetryPolicies {
            default: resilience.default_retry_policy,
            rate_limit: resilience.rate_limit_retry_policy,
            network: resilience.network_retry_policy,
        };

        let models = config
            .models
            .iter()
            .map(|(id, model)| {
                (
                    id.clone(),
                    ModelEntry {
                        fallback_chain: model.fallback_chain.clone(),
                        retry: model.retry.clone(),
                    },
                )
            })
            .collect();

        Self { models, policies }
    }

    /// Register a model with its fallback chain
    pub fn with_model<I, S>(mut self, model_id: impl Into<String>, chain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.models.entry(model_id.into()).or_default();
        entry.fallback_chain = chain.into_iter().map(Into::into).collect();
        self
    }

    /// Override retry policies for one model
    pub fn with_model_retry(mut self, model_id: impl Into<String>, retry: RetryOverrides) -> Self {
        self.models.entry(model_id.into()).or_default().retry = retry;
        self
    }

    pub fn with_policies(mut self, policies: RetryPolicies) -> Self {
        self.policies = policies;
        self
    }

    pub fn policies(&self) -> &RetryPolicies {
        &self.policies
    }

    /// Ordered fallback candidates; empty for unknown models
    pub fn fallback_chain(&self, model_id: &str) -> &[String] {
        self.models
            .get(model_id)
            .map(|entry| entry.fallback_chain.as_slice())
            .unwrap_or(&[])
    }

    /// Retry policy for a failure of `kind` on `model_id`
    pub fn retry_policy(&self, model_id: &str, kind: ProviderErrorKind) -> RetryPolicy {
        self.policies
            .select(kind, self.models.get(model_id).map(|entry| &entry.retry))
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    /// Registered model ids, sorted
    pub fn model_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.models.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;

    #[test]
    fn test_policy_by_kind() {
        let registry = ModelRegistry::new();
        assert_eq!(
            registry.retry_policy("any", ProviderErrorKind::RateLimit),
            RetryPolicy::rate_limit()
        );
        assert_eq!(
            registry.retry_policy("any", ProviderErrorKind::Timeout),
            RetryPolicy::network()
        );
        assert_eq!(
            registry.retry_policy("any", ProviderErrorKind::Connection),
            RetryPolicy::network()
        );
        assert_eq!(
            registry.retry_policy("any", ProviderErrorKind::Api),
            RetryPolicy::default()
        );
    }

    #[test]
    fn test_model_override_wins() {
        let fast = RetryPolicy::rate_limit().with_max_attempts(7);
        let registry = ModelRegistry::new().with_model_retry(
            "gpt-4o",
            RetryOverrides {
                rate_limit: Some(fast),
                ..Default::default()
            },
        );

        assert_eq!(
            registry.retry_policy("gpt-4o", ProviderErrorKind::RateLimit),
            fast
        );
        assert_eq!(
            registry.retry_policy("gpt-4o", ProviderErrorKind::Timeout),
            RetryPolicy::network()
        );
        assert_eq!(
            registry.retry_policy("claude", ProviderErrorKind::RateLimit),
            RetryPolicy::rate_limit()
        );
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.resilience.network_retry_policy = RetryPolicy::network().with_max_attempts(4);
        config.models.insert(
            "gpt-4o".to_string(),
            ModelConfig {
                fallback_chain: vec!["claude".to_string(), "gemini".to_string()],
                retry: RetryOverrides::default(),
            },
        );

        let registry = ModelRegistry::from_config(&config);
        assert_eq!(registry.fallback_chain("gpt-4o"), ["claude", "gemini"]);
        assert!(registry.fallback_chain("claude").is_empty());
        assert_eq!(
            registry
                .retry_policy("gpt-4o", ProviderErrorKind::Connection)
                .max_attempts,
            4
        );
        assert_eq!(registry.model_ids(), vec!["gpt-4o"]);
    }

    #[test]
    fn test_with_model_keeps_retry_overrides() {
        let overrides = RetryOverrides {
            default: Some(RetryPolicy::default().with_max_attempts(1)),
            ..Default::default()
        };
        let registry = ModelRegistry::new()
            .with_model_retry("m", overrides)
            .with_model("m", ["n"]);

        assert_eq!(registry.fallback_chain("m"), ["n"]);
        assert_eq!(
            registry.retry_policy("m", ProviderErrorKind::Api).max_attempts,
            1
        );
    }
}
