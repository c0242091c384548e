//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/llm-resilience/) and project
//! (.llm-resilience/) level configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::circuit_breaker as cb_constants;
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};
use crate::types::{GenerationOptions, ResilienceError, Result};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Circuit breaker and retry settings
    pub resilience: ResilienceConfig,

    /// Defaults for generation requests
    pub generation: GenerationOptions,

    /// Circuit state persistence
    pub storage: StorageConfig,

    /// Per-model fallback chains and retry overrides
    pub models: BTreeMap<String, ModelConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            resilience: ResilienceConfig::default(),
            generation: GenerationOptions::default(),
            storage: StorageConfig::default(),
            models: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `ResilienceError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        let r = &self.resilience;

        if r.failure_threshold == 0 {
            return Err(ResilienceError::Config(
                "resilience.failure_threshold must be greater than 0".to_string(),
            ));
        }

        if r.timeout_seconds == 0 {
            return Err(ResilienceError::Config(
                "resilience.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        for (name, policy) in [
            ("default_retry_policy", &r.default_retry_policy),
            ("rate_limit_retry_policy", &r.rate_limit_retry_policy),
            ("network_retry_policy", &r.network_retry_policy),
        ] {
            policy
                .validate()
                .map_err(|e| ResilienceError::Config(format!("resilience.{}: {}", name, e)))?;
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ResilienceError::Config(format!(
                "generation.temperature must be between 0.0 and 2.0, got {}",
                self.generation.temperature
            )));
        }

        for (model_id, model) in &self.models {
            if model_id.trim().is_empty() {
                return Err(ResilienceError::Config(
                    "models: model id must not be empty".to_string(),
                ));
            }
            if model.fallback_chain.iter().any(|m| m.trim().is_empty()) {
                return Err(ResilienceError::Config(format!(
                    "models.{}.fallback_chain contains an empty model id",
                    model_id
                )));
            }
            for (name, policy) in model.retry.iter() {
                policy.validate().map_err(|e| {
                    ResilienceError::Config(format!("models.{}.retry.{}: {}", model_id, name, e))
                })?;
            }
        }

        Ok(())
    }
}

// =============================================================================
// Resilience Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Consecutive failures before a model's circuit opens
    pub failure_threshold: u32,

    /// Seconds an open circuit rejects calls before a probe
    pub timeout_seconds: u64,

    /// Policy for RECOVERABLE failures without a dedicated policy
    pub default_retry_policy: RetryPolicy,

    /// Policy for rate-limit failures
    pub rate_limit_retry_policy: RetryPolicy,

    /// Policy for timeouts and connection failures
    pub network_retry_policy: RetryPolicy,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: cb_constants::FAILURE_THRESHOLD,
            timeout_seconds: cb_constants::OPEN_TIMEOUT_SECS,
            default_retry_policy: RetryPolicy::default(),
            rate_limit_retry_policy: RetryPolicy::rate_limit(),
            network_retry_policy: RetryPolicy::network(),
        }
    }
}

impl ResilienceConfig {
    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            open_timeout: Duration::from_secs(self.timeout_seconds),
        }
    }
}

// =============================================================================
// Model Configuration
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Models to try, in order, when this one cannot serve a request
    pub fallback_chain: Vec<String>,

    /// Retry policy overrides for this model
    pub retry: RetryOverrides,
}

/// Per-model retry policies; unset entries use the global ones
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RetryPolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<RetryPolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<RetryPolicy>,
}

impl RetryOverrides {
    /// Set overrides with their config key
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &RetryPolicy)> {
        [
            ("rate_limit", self.rate_limit.as_ref()),
            ("network", self.network.as_ref()),
            ("default", self.default.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, policy)| policy.map(|p| (name, p)))
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local; state is lost on exit
    Memory,
    /// SQLite file shared across processes
    #[default]
    Sqlite,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// SQLite database file
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: PathBuf::from(".llm-resilience/circuits.db"),
        }
    }
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: StorageBackend::Memory,
            ..Self::default()
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.path.clone()
    }
}
