//! Unified Error Type System
//!
//! Centralized error types for the resilience layer.
//!
//! ## Severities
//!
//! - **Fatal**: unrecoverable, stop the whole pipeline
//! - **Recoverable**: transient, retry before failing over
//! - **Skippable**: request unusable for this model, fail over without retry
//! - **Degraded**: provider-side outage, fail over without retry
//!
//! Provider failures carry a [`ProviderErrorKind`]; the classifier maps kinds
//! to severities and the orchestrator dispatches on the severity alone.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Severity
// =============================================================================

/// Policy-relevant category of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    /// Unrecoverable - raise immediately, no retry, no fallback
    Fatal,
    /// Transient - retry with backoff, then fall back
    Recoverable,
    /// Malformed or oversized request - fall back without retry
    Skippable,
    /// Provider outage - fall back without retry
    Degraded,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fatal => write!(f, "FATAL"),
            Self::Recoverable => write!(f, "RECOVERABLE"),
            Self::Skippable => write!(f, "SKIPPABLE"),
            Self::Degraded => write!(f, "DEGRADED"),
        }
    }
}

impl ErrorSeverity {
    /// Whether a failure of this severity is worth retrying on the same model
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Recoverable)
    }

    /// Whether a failure of this severity may be routed to a fallback model
    pub fn allows_fallback(&self) -> bool {
        !matches!(self, Self::Fatal)
    }
}

// =============================================================================
// Provider Errors
// =============================================================================

/// Concrete failure type reported by a provider adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Bad or missing credentials
    Authentication,
    /// Account budget or quota exhausted
    BudgetExhausted,
    /// Request rate limited
    RateLimit,
    /// Request timed out
    Timeout,
    /// Could not reach the provider
    Connection,
    /// Request body rejected as malformed
    MalformedRequest,
    /// Request structurally invalid for this model
    InvalidRequest,
    /// Response failed schema validation
    ResponseValidation,
    /// Prompt exceeds the model's context window
    ContextWindowExceeded,
    /// Provider reports the service is unavailable
    ServiceUnavailable,
    /// Generic provider-side API error
    Api,
    /// Anything the adapter could not identify
    Unknown,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Authentication => "authentication",
            Self::BudgetExhausted => "budget_exhausted",
            Self::RateLimit => "rate_limit",
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::MalformedRequest => "malformed_request",
            Self::InvalidRequest => "invalid_request",
            Self::ResponseValidation => "response_validation",
            Self::ContextWindowExceeded => "context_window_exceeded",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Api => "api",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl ProviderErrorKind {
    /// Map an HTTP status code to a failure kind
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            402 => Self::BudgetExhausted,
            429 => Self::RateLimit,
            408 | 504 => Self::Timeout,
            400 => Self::MalformedRequest,
            404 | 422 => Self::InvalidRequest,
            413 => Self::ContextWindowExceeded,
            502 | 503 => Self::ServiceUnavailable,
            500..=599 => Self::Api,
            _ => Self::Unknown,
        }
    }

    /// Rate-limit and network kinds carry their own retry policies
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connection)
    }
}

/// Structured failure from a provider call
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderError {
    /// Failure type used for classification
    pub kind: ProviderErrorKind,
    /// Detailed error message
    pub message: String,
    /// Model that produced the error
    pub model_id: Option<String>,
    /// HTTP status, when the transport exposed one
    pub status: Option<u16>,
    /// Provider's suggested wait before retrying
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.model_id {
            Some(model) => write!(f, "[{}:{}] {}", model, self.kind, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            model_id: None,
            status: None,
            retry_after: None,
        }
    }

    /// Build from an HTTP status code and response body
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(ProviderErrorKind::from_http_status(status), message)
        }
    }

    /// Attach the model that produced the error
    pub fn model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// Attach the provider's retry-after hint
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Authentication, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimit, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Connection, message)
    }

    pub fn malformed_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::MalformedRequest, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ServiceUnavailable, message)
    }
}

// =============================================================================
// Orchestrator Errors
// =============================================================================

/// Fatal outcome of a generation request
///
/// Only FATAL failures surface as errors; every other severity is absorbed
/// into a degraded message by the orchestrator.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineError {
    pub message: String,
    pub severity: ErrorSeverity,
    #[source]
    pub original_error: ProviderError,
}

impl PipelineError {
    pub fn fatal(model_id: &str, original_error: ProviderError) -> Self {
        Self {
            message: format!(
                "Fatal error from model '{}': {}",
                model_id, original_error.message
            ),
            severity: ErrorSeverity::Fatal,
            original_error,
        }
    }
}

/// Call rejected because the model's circuit is open
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Circuit open for model '{model_id}' since {opened_at} (timeout {timeout:?})")]
pub struct CircuitOpen {
    pub model_id: String,
    pub opened_at: DateTime<Utc>,
    pub timeout: Duration,
}

impl CircuitOpen {
    /// Time left until the circuit admits a half-open probe
    pub fn retry_in(&self, now: DateTime<Utc>) -> Duration {
        let elapsed = (now - self.opened_at).to_std().unwrap_or_default();
        self.timeout.saturating_sub(elapsed)
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ResilienceError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpen),
}

pub type Result<T> = std::result::Result<T, ResilienceError>;

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| ResilienceError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| ResilienceError::Storage(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_display() {
        assert_eq!(ErrorSeverity::Fatal.to_string(), "FATAL");
        assert_eq!(ErrorSeverity::Recoverable.to_string(), "RECOVERABLE");
        assert_eq!(ErrorSeverity::Skippable.to_string(), "SKIPPABLE");
        assert_eq!(ErrorSeverity::Degraded.to_string(), "DEGRADED");
    }

    #[test]
    fn test_severity_routing_flags() {
        assert!(ErrorSeverity::Recoverable.is_retryable());
        assert!(!ErrorSeverity::Skippable.is_retryable());
        assert!(!ErrorSeverity::Fatal.allows_fallback());
        assert!(ErrorSeverity::Degraded.allows_fallback());
    }

    #[test]
    fn test_kind_from_http_status() {
        assert_eq!(
            ProviderErrorKind::from_http_status(401),
            ProviderErrorKind::Authentication
        );
        assert_eq!(
            ProviderErrorKind::from_http_status(429),
            ProviderErrorKind::RateLimit
        );
        assert_eq!(
            ProviderErrorKind::from_http_status(413),
            ProviderErrorKind::ContextWindowExceeded
        );
        assert_eq!(
            ProviderErrorKind::from_http_status(503),
            ProviderErrorKind::ServiceUnavailable
        );
        assert_eq!(ProviderErrorKind::from_http_status(500), ProviderErrorKind::Api);
        assert_eq!(
            ProviderErrorKind::from_http_status(302),
            ProviderErrorKind::Unknown
        );
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::rate_limit("Too many requests").model("gpt-4o");
        assert_eq!(err.to_string(), "[gpt-4o:rate_limit] Too many requests");

        let bare = ProviderError::connection("Connection reset");
        assert_eq!(bare.to_string(), "[connection] Connection reset");
    }

    #[test]
    fn test_provider_error_from_status_keeps_status() {
        let err = ProviderError::from_http_status(429, "slow down");
        assert_eq!(err.kind, ProviderErrorKind::RateLimit);
        assert_eq!(err.status, Some(429));
    }

    #[test]
    fn test_pipeline_error_carries_source() {
        let err = PipelineError::fatal("claude", ProviderError::authentication("bad key"));
        assert_eq!(err.severity, ErrorSeverity::Fatal);
        assert_eq!(err.to_string(), "Fatal error from model 'claude': bad key");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("[authentication] bad key"));
    }

    #[test]
    fn test_circuit_open_retry_in() {
        let opened_at = Utc::now();
        let open = CircuitOpen {
            model_id: "m".to_string(),
            opened_at,
            timeout: Duration::from_secs(300),
        };
        let later = opened_at + chrono::Duration::seconds(100);
        assert_eq!(open.retry_in(later), Duration::from_secs(200));

        let much_later = opened_at + chrono::Duration::seconds(1000);
        assert_eq!(open.retry_in(much_later), Duration::ZERO);
    }
}
