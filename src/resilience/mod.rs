//! Resilience layer: classification, retry, circuit breaking and fallback
//! around a single injected provider call.

pub mod circuit_breaker;
pub mod classifier;
pub mod fallback;
pub mod orchestrator;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitRecord, CircuitState,
};
pub use classifier::ErrorClassifier;
pub use fallback::{AttemptedModels, FallbackRouter};
pub use orchestrator::{
    CallOrchestrator, CallOrchestratorBuilder, DegradedReason, GenerationOutcome,
};
pub use registry::{ModelRegistry, RetryPolicies};
pub use retry::{RetryError, RetryObserver, RetryPolicy, retry_async, retry_blocking};
