//! Call Orchestrator
//!
//! Entry point for resilient generation. Each request walks a worklist of
//! models, starting from the requested one:
//!
//! 1. Gate the model through its circuit breaker
//! 2. Call the provider
//! 3. On failure, classify and record it once, then dispatch on severity:
//!    - **FATAL**: stop with [`PipelineError`], no retry, no fallback
//!    - **RECOVERABLE**: retry with the kind's policy, then fall back
//!    - **SKIPPABLE** / **DEGRADED**: fall back immediately
//! 4. Fall back to the next untried model on the route (the failed model's
//!    chain first, then earlier models' chains), or answer with a degraded
//!    message when none is left
//!
//! The attempted set grows by one model per step and the router never
//! returns an attempted model, so the loop runs at most once per reachable
//! model.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::constants::messages;
use crate::metrics::{ResilienceMetrics, SharedMetrics};
use crate::provider::SharedProvider;
use crate::storage::{self, SharedCircuitStore};
use crate::types::{
    ChatMessage, ErrorSeverity, GenerationOptions, ModelCallRequest, ModelResponse, PipelineError,
    ProviderError, ResilienceError, Result, TokenUsage,
};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};
use super::classifier::ErrorClassifier;
use super::fallback::{AttemptedModels, FallbackRouter};
use super::registry::ModelRegistry;
use super::retry::{RetryError, retry_async};

// =============================================================================
// Outcomes
// =============================================================================

/// Why a request was answered with a degraded message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    /// Circuit open and no fallback left
    CircuitOpen,
    /// RECOVERABLE failure outlasted its retries
    RetriesExhausted,
    /// SKIPPABLE failure: the model cannot take this request
    InvalidRequest,
    /// DEGRADED failure: provider-side outage
    ServiceUnavailable,
}

impl DegradedReason {
    fn from_severity(severity: ErrorSeverity) -> Option<Self> {
        match severity {
            ErrorSeverity::Fatal => None,
            ErrorSeverity::Recoverable => Some(Self::RetriesExhausted),
            ErrorSeverity::Skippable => Some(Self::InvalidRequest),
            ErrorSeverity::Degraded => Some(Self::ServiceUnavailable),
        }
    }

    /// Caller-facing text for a request that ended on `model_id`
    pub fn message(&self, model_id: &str) -> String {
        match self {
            Self::CircuitOpen => format!(
                "The AI model '{}' {}",
                model_id,
                messages::TEMPORARILY_UNAVAILABLE
            ),
            Self::RetriesExhausted => messages::HIGH_DEMAND.to_string(),
            Self::InvalidRequest => format!(
                "The AI model '{}' {}. Try shortening or rephrasing it.",
                model_id,
                messages::REQUEST_INVALID
            ),
            Self::ServiceUnavailable => messages::SERVICE_UNAVAILABLE.to_string(),
        }
    }
}

impl std::fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CircuitOpen => write!(f, "circuit_open"),
            Self::RetriesExhausted => write!(f, "retries_exhausted"),
            Self::InvalidRequest => write!(f, "invalid_request"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
        }
    }
}

/// Result of one non-fatal generation request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationOutcome {
    /// Model output, or the degraded message
    pub content: String,
    /// Model that served the request, or the last one tried
    pub model_id: String,
    /// Every model tried, in order
    pub attempted: AttemptedModels,
    /// Set when `content` is a degraded message
    pub degraded: Option<DegradedReason>,
    pub usage: TokenUsage,
}

impl GenerationOutcome {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// Served by a model other than the one requested
    pub fn used_fallback(&self) -> bool {
        self.attempted.len() > 1
    }
}

enum AttemptOutcome {
    Served(ModelResponse),
    Failed(DegradedReason),
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Resilient front door to a model provider
pub struct CallOrchestrator {
    provider: SharedProvider,
    breaker: CircuitBreaker,
    registry: Arc<ModelRegistry>,
    router: FallbackRouter,
    metrics: SharedMetrics,
}

impl CallOrchestrator {
    pub fn builder() -> CallOrchestratorBuilder {
        CallOrchestratorBuilder::default()
    }

    /// Build from loaded configuration, opening the configured store
    pub fn from_config(config: &Config, provider: SharedProvider) -> Result<Self> {
        let store = storage::open_store(&config.storage)?;
        Self::builder()
            .provider(provider)
            .store(store)
            .registry(ModelRegistry::from_config(config))
            .circuit_breaker(config.resilience.circuit_breaker())
            .build()
    }

    /// Generate a response, or fail only for FATAL outcomes.
    ///
    /// Non-fatal failures that survive retries and fallbacks yield a
    /// degraded message instead of an error.
    pub async fn generate_response(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> std::result::Result<String, PipelineError> {
        self.generate(model_id, messages, options)
            .await
            .map(|outcome| outcome.content)
    }

    /// Like [`generate_response`](Self::generate_response), with routing details
    #[instrument(
        skip_all,
        fields(request_id = %uuid::Uuid::new_v4(), model = %model_id)
    )]
    pub async fn generate(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> std::result::Result<GenerationOutcome, PipelineError> {
        self.metrics.record_request();

        let request = ModelCallRequest::new(model_id, messages, options);
        let mut attempted = AttemptedModels::new();
        let mut current = model_id.to_string();

        loop {
            attempted = attempted.with(&current);

            let reason = match self.attempt_model(&request.for_model(&current)).await? {
                AttemptOutcome::Served(response) => {
                    self.metrics.record_success(&response.usage);
                    info!(
                        served_by = %current,
                        attempted = attempted.len(),
                        "Generation succeeded"
                    );
                    return Ok(GenerationOutcome {
                        content: response.content,
                        model_id: current,
                        attempted,
                        degraded: None,
                        usage: response.usage,
                    });
                }
                AttemptOutcome::Failed(reason) => reason,
            };

            match self.router.next_untried(&attempted) {
                Some(next) => {
                    info!(from = %current, to = next, %reason, "Falling back");
                    self.metrics.record_fallback();
                    current = next.to_string();
                }
                None => {
                    warn!(
                        last_model = %current,
                        %reason,
                        attempted = ?attempted.as_slice(),
                        "No fallback left, returning degraded response"
                    );
                    self.metrics.record_degraded();
                    return Ok(GenerationOutcome {
                        content: reason.message(&current),
                        model_id: current,
                        attempted,
                        degraded: Some(reason),
                        usage: TokenUsage::default(),
                    });
                }
            }
        }
    }

    /// Force a model's circuit closed
    pub fn reset_circuit(&self, model_id: &str) {
        self.breaker.reset(model_id);
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn circuit_stats(&self) -> Vec<CircuitBreakerStats> {
        self.breaker.stats()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    // =========================================================================
    // Per-model attempt
    // =========================================================================

    async fn attempt_model(
        &self,
        request: &ModelCallRequest,
    ) -> std::result::Result<AttemptOutcome, PipelineError> {
        let model_id = request.model_id.as_str();

        if let Err(open) = self.breaker.check_circuit(model_id) {
            self.metrics.record_circuit_rejection();
            debug!(
                model = model_id,
                retry_in_secs = open.retry_in(Utc::now()).as_secs(),
                "Skipping model (circuit OPEN)"
            );
            return Ok(AttemptOutcome::Failed(DegradedReason::CircuitOpen));
        }

        let error = match self.call_provider(request).await {
            Ok(response) => {
                self.breaker.record_success(model_id);
                return Ok(AttemptOutcome::Served(response));
            }
            Err(error) => error,
        };

        match self.observe_failure(model_id, &error) {
            ErrorSeverity::Fatal => Err(self.fatal(model_id, error)),
            ErrorSeverity::Recoverable => self.retry_model(request, error).await,
            severity => Ok(AttemptOutcome::Failed(Self::reason_for(severity))),
        }
    }

    /// Retry a RECOVERABLE failure, restricted to the failure's own kind
    async fn retry_model(
        &self,
        request: &ModelCallRequest,
        error: ProviderError,
    ) -> std::result::Result<AttemptOutcome, PipelineError> {
        let model_id = request.model_id.as_str();
        let policy = self.registry.retry_policy(model_id, error.kind);
        let retryable = HashSet::from([error.kind]);

        debug!(
            model = model_id,
            kind = %error.kind,
            max_attempts = policy.max_attempts,
            "Retrying recoverable failure"
        );

        let observer = |attempt: u32, err: &ProviderError, delay: Duration| {
            self.metrics.record_retry();
            warn!(
                model = model_id,
                attempt = attempt + 1,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retry attempt failed, backing off"
            );
        };

        let result = retry_async(
            || self.call_provider(request),
            &retryable,
            &policy,
            Some(&observer),
        )
        .await;

        match result {
            Ok(response) => {
                self.breaker.record_success(model_id);
                Ok(AttemptOutcome::Served(response))
            }
            Err(RetryError::Exhausted { attempts, source }) => {
                warn!(
                    model = model_id,
                    attempts,
                    error = %source,
                    "Retries exhausted"
                );
                Ok(AttemptOutcome::Failed(DegradedReason::RetriesExhausted))
            }
            // A different failure mode surfaced mid-run; no nested retry run
            Err(RetryError::NotRetryable(other)) => match self.observe_failure(model_id, &other) {
                ErrorSeverity::Fatal => Err(self.fatal(model_id, other)),
                severity => Ok(AttemptOutcome::Failed(Self::reason_for(severity))),
            },
        }
    }

    async fn call_provider(
        &self,
        request: &ModelCallRequest,
    ) -> std::result::Result<ModelResponse, ProviderError> {
        self.metrics.record_provider_call();
        self.provider.call(request).await.map_err(|err| {
            if err.model_id.is_none() {
                err.model(&request.model_id)
            } else {
                err
            }
        })
    }

    /// Classify a failure and report it to the breaker exactly once
    fn observe_failure(&self, model_id: &str, error: &ProviderError) -> ErrorSeverity {
        let severity = ErrorClassifier::classify(error);
        self.breaker.record_failure(model_id, &error.to_string());
        self.metrics.record_failure(severity);

        debug!(
            model = model_id,
            kind = %error.kind,
            %severity,
            error = %error.message,
            "Provider call failed"
        );
        severity
    }

    fn fatal(&self, model_id: &str, error: ProviderError) -> PipelineError {
        self.metrics.record_fatal();
        error!(model = model_id, error = %error, "Fatal provider error");
        PipelineError::fatal(model_id, error)
    }

    fn reason_for(severity: ErrorSeverity) -> DegradedReason {
        DegradedReason::from_severity(severity).unwrap_or(DegradedReason::ServiceUnavailable)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`CallOrchestrator`]
#[derive(Default)]
pub struct CallOrchestratorBuilder {
    provider: Option<SharedProvider>,
    store: Option<SharedCircuitStore>,
    registry: Option<ModelRegistry>,
    breaker_config: CircuitBreakerConfig,
    metrics: Option<SharedMetrics>,
}

impl CallOrchestratorBuilder {
    pub fn provider(mut self, provider: SharedProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Circuit state store; defaults to a fresh in-memory store
    pub fn store(mut self, store: SharedCircuitStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    /// Share counters with other orchestrators
    pub fn metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<CallOrchestrator> {
        let provider = self.provider.ok_or_else(|| {
            ResilienceError::Config("CallOrchestrator requires a provider".to_string())
        })?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(storage::InMemoryCircuitStore::new()));
        let registry = Arc::new(self.registry.unwrap_or_default());

        Ok(CallOrchestrator {
            provider,
            breaker: CircuitBreaker::new(store, self.breaker_config),
            router: FallbackRouter::new(registry.clone()),
            registry,
            metrics: self
                .metrics
                .unwrap_or_else(|| Arc::new(ResilienceMetrics::new())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ModelProvider;
    use crate::resilience::registry::RetryPolicies;
    use crate::resilience::retry::RetryPolicy;
    use crate::resilience::{CircuitRecord, CircuitState};
    use crate::storage::{CircuitStateStore, InMemoryCircuitStore};
    use crate::types::ProviderErrorKind;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    type Step = std::result::Result<&'static str, ProviderErrorKind>;

    /// Scripted provider: each model plays its script, then repeats `then`
    #[derive(Default)]
    struct MockProvider {
        scripts: Mutex<HashMap<String, (VecDeque<Step>, Step)>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockProvider {
        fn always(self, model: &str, step: Step) -> Self {
            self.script(model, vec![], step)
        }

        fn script(self, model: &str, steps: Vec<Step>, then: Step) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(model.to_string(), (steps.into(), then));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn calls_to(&self, model: &str) -> usize {
            self.calls().iter().filter(|m| *m == model).count()
        }
    }

    #[async_trait]
    impl ModelProvider for MockProvider {
        async fn call(
            &self,
            request: &ModelCallRequest,
        ) -> std::result::Result<ModelResponse, ProviderError> {
            self.calls.lock().unwrap().push(request.model_id.clone());

            let step = {
                let mut scripts = self.scripts.lock().unwrap();
                match scripts.get_mut(&request.model_id) {
                    Some((steps, then)) => steps.pop_front().unwrap_or(*then),
                    None => Err(ProviderErrorKind::InvalidRequest),
                }
            };

            match step {
                Ok(content) => Ok(ModelResponse::text(&request.model_id, content).with_usage(
                    TokenUsage {
                        input_tokens: 10,
                        output_tokens: 5,
                    },
                )),
                Err(kind) => Err(ProviderError::new(kind, format!("{kind} from mock"))),
            }
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn quiet_policies() -> RetryPolicies {
        RetryPolicies {
            default: RetryPolicy::default().with_jitter(false),
            rate_limit: RetryPolicy::rate_limit().with_jitter(false),
            network: RetryPolicy::network().with_jitter(false),
        }
    }

    struct Harness {
        orchestrator: CallOrchestrator,
        provider: Arc<MockProvider>,
        store: Arc<InMemoryCircuitStore>,
    }

    fn harness(provider: MockProvider, chains: &[(&str, &[&str])]) -> Harness {
        let provider = Arc::new(provider);
        let store = Arc::new(InMemoryCircuitStore::new());
        let registry = chains
            .iter()
            .fold(ModelRegistry::new(), |r, (model, chain)| {
                r.with_model(*model, chain.iter().copied())
            })
            .with_policies(quiet_policies());

        let orchestrator = CallOrchestrator::builder()
            .provider(provider.clone())
            .store(store.clone())
            .registry(registry)
            .build()
            .unwrap();

        Harness {
            orchestrator,
            provider,
            store,
        }
    }

    fn msgs() -> Vec<ChatMessage> {
        vec![ChatMessage::user("Summarize today's headlines")]
    }

    impl Harness {
        async fn generate(&self, model: &str) -> std::result::Result<GenerationOutcome, PipelineError> {
            self.orchestrator
                .generate(model, &msgs(), &GenerationOptions::default())
                .await
        }

        fn record(&self, model: &str) -> CircuitRecord {
            self.store.get_state(model).unwrap()
        }

        fn trip(&self, model: &str) {
            for _ in 0..5 {
                self.orchestrator
                    .circuit_breaker()
                    .record_failure(model, "seeded");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_returns_content() {
        let h = harness(MockProvider::default().always("a", Ok("hello")), &[]);

        let outcome = h.generate("a").await.unwrap();
        assert_eq!(outcome.content, "hello");
        assert_eq!(outcome.model_id, "a");
        assert!(!outcome.is_degraded());
        assert!(!outcome.used_fallback());
        assert_eq!(outcome.usage.total(), 15);
        assert_eq!(h.record("a").state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_then_malformed_then_success() {
        let h = harness(
            MockProvider::default()
                .always("a", Err(ProviderErrorKind::RateLimit))
                .always("b", Err(ProviderErrorKind::MalformedRequest))
                .always("c", Ok("from c")),
            &[("a", &["b", "c"])],
        );

        let started = tokio::time::Instant::now();
        let outcome = h.generate("a").await.unwrap();

        assert_eq!(outcome.content, "from c");
        assert_eq!(outcome.model_id, "c");
        assert_eq!(outcome.attempted.as_slice(), ["a", "b", "c"]);

        // initial call plus a full rate-limit retry run of 3 attempts
        assert_eq!(h.provider.calls_to("a"), 4);
        assert_eq!(h.provider.calls_to("b"), 1);
        assert_eq!(h.provider.calls_to("c"), 1);

        // backoff between the 3 retry attempts: 2s then 4s
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(7), "elapsed {elapsed:?}");

        assert_eq!(h.record("a").consecutive_failures, 1);
        assert_eq!(h.record("b").consecutive_failures, 1);
        assert_eq!(h.record("c").state, CircuitState::Closed);

        let metrics = h.orchestrator.metrics().snapshot();
        assert_eq!(metrics.retries, 2);
        assert_eq!(metrics.fallbacks, 2);
        assert_eq!(metrics.provider_calls, 6);
        assert_eq!(metrics.successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_error_is_fatal_without_retry_or_fallback() {
        let h = harness(
            MockProvider::default()
                .always("a", Err(ProviderErrorKind::Authentication))
                .always("b", Ok("never")),
            &[("a", &["b"])],
        );

        let err = h.generate("a").await.unwrap_err();
        assert_eq!(err.severity, ErrorSeverity::Fatal);
        assert_eq!(err.original_error.kind, ProviderErrorKind::Authentication);
        assert_eq!(err.original_error.model_id.as_deref(), Some("a"));

        assert_eq!(h.provider.calls(), vec!["a"]);
        let metrics = h.orchestrator.metrics().snapshot();
        assert_eq!(metrics.retries, 0);
        assert_eq!(metrics.fallbacks, 0);
        assert_eq!(metrics.fatal_errors, 1);
        assert_eq!(h.record("a").consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_without_fallback_skips_provider() {
        let h = harness(MockProvider::default().always("a", Ok("never")), &[]);
        h.trip("a");

        let response = h
            .orchestrator
            .generate_response("a", &msgs(), &GenerationOptions::default())
            .await
            .unwrap();

        assert!(response.contains("temporarily unavailable"), "{response}");
        assert!(response.contains("'a'"));
        assert!(h.provider.calls().is_empty());
        assert_eq!(h.record("a").consecutive_failures, 5);
        assert_eq!(h.orchestrator.metrics().snapshot().circuit_rejections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_falls_back() {
        let h = harness(
            MockProvider::default()
                .always("a", Ok("never"))
                .always("b", Ok("from b")),
            &[("a", &["b"])],
        );
        h.trip("a");

        let outcome = h.generate("a").await.unwrap();
        assert_eq!(outcome.content, "from b");
        assert_eq!(h.provider.calls(), vec!["b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_resets_failure_count() {
        let h = harness(
            MockProvider::default().script(
                "a",
                vec![
                    Err(ProviderErrorKind::Timeout),
                    Err(ProviderErrorKind::Timeout),
                ],
                Ok("recovered"),
            ),
            &[],
        );
        for _ in 0..3 {
            h.orchestrator.circuit_breaker().record_failure("a", "earlier");
        }

        let outcome = h.generate("a").await.unwrap();
        assert_eq!(outcome.content, "recovered");
        assert_eq!(h.provider.calls_to("a"), 3);

        let record = h.record("a");
        assert_eq!(record.state, CircuitState::Closed);
        assert_eq!(record.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_mid_retry_propagates() {
        let h = harness(
            MockProvider::default()
                .script(
                    "a",
                    vec![Err(ProviderErrorKind::RateLimit)],
                    Err(ProviderErrorKind::BudgetExhausted),
                )
                .always("b", Ok("never")),
            &[("a", &["b"])],
        );

        let err = h.generate("a").await.unwrap_err();
        assert_eq!(err.original_error.kind, ProviderErrorKind::BudgetExhausted);
        assert_eq!(h.provider.calls(), vec!["a", "a"]);
        assert_eq!(h.record("a").consecutive_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_kind_mid_retry_ends_the_run() {
        let h = harness(
            MockProvider::default()
                .script(
                    "a",
                    vec![Err(ProviderErrorKind::RateLimit)],
                    Err(ProviderErrorKind::ContextWindowExceeded),
                )
                .always("b", Ok("from b")),
            &[("a", &["b"])],
        );

        let outcome = h.generate("a").await.unwrap();
        assert_eq!(outcome.content, "from b");
        assert_eq!(h.provider.calls(), vec!["a", "a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skippable_without_fallback_degrades() {
        let h = harness(
            MockProvider::default().always("a", Err(ProviderErrorKind::ContextWindowExceeded)),
            &[],
        );

        let outcome = h.generate("a").await.unwrap();
        assert_eq!(outcome.degraded, Some(DegradedReason::InvalidRequest));
        assert!(outcome.content.contains(messages::REQUEST_INVALID));
        assert_eq!(h.provider.calls_to("a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_without_fallback_degrades() {
        let h = harness(
            MockProvider::default().always("a", Err(ProviderErrorKind::Connection)),
            &[],
        );

        let outcome = h.generate("a").await.unwrap();
        assert_eq!(outcome.degraded, Some(DegradedReason::RetriesExhausted));
        assert_eq!(outcome.content, messages::HIGH_DEMAND);
        // initial call plus a network retry run of 2 attempts
        assert_eq!(h.provider.calls_to("a"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_error_is_fatal() {
        let h = harness(
            MockProvider::default()
                .always("a", Err(ProviderErrorKind::Unknown))
                .always("b", Ok("never")),
            &[("a", &["b"])],
        );

        let err = h.generate("a").await.unwrap_err();
        assert_eq!(err.severity, ErrorSeverity::Fatal);
        assert_eq!(h.provider.calls(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cyclic_chain_terminates() {
        let h = harness(
            MockProvider::default()
                .always("a", Err(ProviderErrorKind::ServiceUnavailable))
                .always("b", Err(ProviderErrorKind::Api)),
            &[("a", &["b"]), ("b", &["a"])],
        );

        let outcome = h.generate("a").await.unwrap();
        assert_eq!(outcome.degraded, Some(DegradedReason::ServiceUnavailable));
        assert_eq!(outcome.content, messages::SERVICE_UNAVAILABLE);
        assert_eq!(outcome.model_id, "b");
        assert_eq!(h.provider.calls(), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_failures_trip_the_circuit() {
        let h = harness(
            MockProvider::default().always("a", Err(ProviderErrorKind::ServiceUnavailable)),
            &[],
        );

        for _ in 0..5 {
            h.generate("a").await.unwrap();
        }
        assert_eq!(h.record("a").state, CircuitState::Open);
        assert_eq!(h.provider.calls_to("a"), 5);

        let outcome = h.generate("a").await.unwrap();
        assert_eq!(outcome.degraded, Some(DegradedReason::CircuitOpen));
        assert_eq!(h.provider.calls_to("a"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_closes_on_success() {
        let h = harness(MockProvider::default().always("a", Ok("back")), &[]);
        h.trip("a");

        let mut record = h.record("a");
        record.opened_at = record
            .opened_at
            .map(|t| t - chrono::Duration::seconds(301));
        h.store.put_state(&record).unwrap();

        let outcome = h.generate("a").await.unwrap();
        assert_eq!(outcome.content, "back");
        assert_eq!(h.record("a").state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_circuit() {
        let h = harness(MockProvider::default().always("a", Ok("ok")), &[]);
        h.trip("a");
        assert!(h.generate("a").await.unwrap().is_degraded());

        h.orchestrator.reset_circuit("a");
        let outcome = h.generate("a").await.unwrap();
        assert_eq!(outcome.content, "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_are_independent() {
        let h = harness(
            MockProvider::default()
                .always("a", Err(ProviderErrorKind::MalformedRequest))
                .always("b", Ok("from b")),
            &[("a", &["b"])],
        );

        let requests = (0..16).map(|_| h.generate("a"));
        let outcomes = futures::future::join_all(requests).await;

        for outcome in outcomes {
            let outcome = outcome.unwrap();
            assert_eq!(outcome.content, "from b");
            assert_eq!(outcome.attempted.as_slice(), ["a", "b"]);
        }
        assert_eq!(h.orchestrator.metrics().snapshot().requests, 16);
        assert_eq!(h.provider.calls_to("b"), 16);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_route_reports_last_model() {
        let h = harness(
            MockProvider::default()
                .always("a", Err(ProviderErrorKind::RateLimit))
                .always("b", Ok("never")),
            &[("a", &["b"])],
        );
        h.trip("b");

        let outcome = h.generate("a").await.unwrap();
        assert_eq!(outcome.degraded, Some(DegradedReason::CircuitOpen));
        assert_eq!(outcome.model_id, "b");
        assert_eq!(outcome.content, DegradedReason::CircuitOpen.message("b"));
        assert_eq!(outcome.attempted.as_slice(), ["a", "b"]);
        assert_eq!(h.provider.calls_to("b"), 0);
    }

    #[test]
    fn test_builder_requires_provider() {
        assert!(CallOrchestrator::builder().build().is_err());
    }

    #[test]
    fn test_degraded_messages() {
        assert_eq!(
            DegradedReason::CircuitOpen.message("gpt-4o"),
            format!("The AI model 'gpt-4o' {}", messages::TEMPORARILY_UNAVAILABLE)
        );
        assert_eq!(
            DegradedReason::ServiceUnavailable.message("x"),
            messages::SERVICE_UNAVAILABLE
        );
        assert_eq!(DegradedReason::from_severity(ErrorSeverity::Fatal), None);
    }
}
