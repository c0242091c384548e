//! CLI Common Utilities
//!
//! Shared initialization and context management for CLI commands.

use std::path::Path;

use crate::config::{Config, ConfigLoader, StorageBackend};
use crate::resilience::{CircuitBreaker, FallbackRouter, ModelRegistry};
use crate::storage;
use crate::types::{ResilienceError, Result};

/// Command execution context
///
/// Loaded configuration plus a circuit breaker over the configured store.
pub struct CommandContext {
    pub config: Config,
    pub breaker: CircuitBreaker,
    pub registry: std::sync::Arc<ModelRegistry>,
}

impl CommandContext {
    /// Load config (from `config_path` if given) and open the circuit store
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = load_config(config_path)?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        if config.storage.backend == StorageBackend::Memory {
            tracing::warn!("storage.backend is 'memory'; circuit state is not shared with other processes");
        }

        let store = storage::open_store(&config.storage)?;
        let breaker = CircuitBreaker::new(store, config.resilience.circuit_breaker());
        let registry = std::sync::Arc::new(ModelRegistry::from_config(&config));

        Ok(Self {
            config,
            breaker,
            registry,
        })
    }

    pub fn router(&self) -> FallbackRouter {
        FallbackRouter::new(self.registry.clone())
    }
}

/// Load configuration from an explicit file or the full resolution chain
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Output format shared by read-only commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = ResilienceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ResilienceError::Config(format!(
                "Invalid format '{}'. Valid values: text, json",
                other
            ))),
        }
    }
}
