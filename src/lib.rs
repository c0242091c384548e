//! llm-resilience - Resilient LLM Model Calls
//!
//! Wraps a provider's "generate text for a model" capability with failure
//! classification, exponential-backoff retry, a persistent per-model
//! circuit breaker and configured fallback chains.
//!
//! ## Quick Start
//!
//! ```ignore
//! use llm_resilience::{CallOrchestrator, ChatMessage, ConfigLoader};
//!
//! let config = ConfigLoader::load()?;
//! let orchestrator = CallOrchestrator::from_config(&config, provider)?;
//! let outcome = orchestrator
//!     .generate("gpt-4o", &[ChatMessage::user("Hello")], &config.generation)
//!     .await?;
//! println!("{} (via {})", outcome.content, outcome.model_id);
//! ```
//!
//! ## Modules
//!
//! - [`resilience`]: Classifier, retry engine, circuit breaker, fallback router, orchestrator
//! - [`provider`]: Injected model invocation trait and timeout wrapper
//! - [`storage`]: Circuit state store (SQLite with connection pooling, or in-memory)
//! - [`config`]: Layered TOML/env configuration
//! - [`metrics`]: Call counters for monitoring

pub mod cli;
pub mod config;
pub mod constants;
pub mod metrics;
pub mod provider;
pub mod resilience;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader, ModelConfig, ResilienceConfig, StorageConfig};

// Error Types
pub use types::error::{
    CircuitOpen, ErrorSeverity, PipelineError, ProviderError, ProviderErrorKind, ResilienceError,
    Result, ResultExt,
};
pub use types::message::{ChatMessage, GenerationOptions, ModelCallRequest, ModelResponse, Role};

// Storage
pub use storage::{CircuitStateStore, Database, InMemoryCircuitStore, SharedCircuitStore};

// =============================================================================
// Resilience Re-exports
// =============================================================================

pub use resilience::{
    CallOrchestrator, CallOrchestratorBuilder, CircuitBreaker, CircuitBreakerConfig,
    CircuitState, DegradedReason, ErrorClassifier, FallbackRouter, GenerationOutcome,
    ModelRegistry, RetryPolicy,
};

pub use metrics::{MetricsSnapshot, ResilienceMetrics, SharedMetrics};
pub use provider::{ModelProvider, SharedProvider, TimeoutProvider};
