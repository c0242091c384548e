//! Error Classifier
//!
//! Maps a provider failure to the [`ErrorSeverity`] that drives retry and
//! fallback decisions. The mapping is a static table keyed by
//! [`ProviderErrorKind`]; kinds missing from the table are FATAL so an
//! unrecognized failure mode is never silently retried or routed around.

use crate::types::{ErrorSeverity, ProviderError, ProviderErrorKind};

/// Severity of every mapped failure kind
const SEVERITY_TABLE: &[(ProviderErrorKind, ErrorSeverity)] = &[
    (ProviderErrorKind::Authentication, ErrorSeverity::Fatal),
    (ProviderErrorKind::BudgetExhausted, ErrorSeverity::Fatal),
    (ProviderErrorKind::RateLimit, ErrorSeverity::Recoverable),
    (ProviderErrorKind::Timeout, ErrorSeverity::Recoverable),
    (ProviderErrorKind::Connection, ErrorSeverity::Recoverable),
    (ProviderErrorKind::MalformedRequest, ErrorSeverity::Skippable),
    (ProviderErrorKind::InvalidRequest, ErrorSeverity::Skippable),
    (ProviderErrorKind::ResponseValidation, ErrorSeverity::Skippable),
    (ProviderErrorKind::ContextWindowExceeded, ErrorSeverity::Skippable),
    (ProviderErrorKind::ServiceUnavailable, ErrorSeverity::Degraded),
    (ProviderErrorKind::Api, ErrorSeverity::Degraded),
];

/// Severity assigned to kinds absent from the table
pub const UNMAPPED_SEVERITY: ErrorSeverity = ErrorSeverity::Fatal;

/// Error classifier for severity routing
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a provider error
    pub fn classify(error: &ProviderError) -> ErrorSeverity {
        Self::severity_of(error.kind)
    }

    /// Table lookup for a failure kind
    pub fn severity_of(kind: ProviderErrorKind) -> ErrorSeverity {
        SEVERITY_TABLE
            .iter()
            .find(|(mapped, _)| *mapped == kind)
            .map(|(_, severity)| *severity)
            .unwrap_or(UNMAPPED_SEVERITY)
    }

    /// Infer a failure kind from a raw error message.
    ///
    /// For adapters wrapping SDKs that only expose strings. Patterns are
    /// checked from most to least specific; context overflow comes first
    /// because its messages often also mention "request" or "token".
    pub fn infer_kind(message: &str) -> ProviderErrorKind {
        let lower = message.to_lowercase();
        let has = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

        if has(&[
            "context_length_exceeded",
            "context length",
            "context window",
            "maximum context",
            "too many tokens",
            "request too large",
        ]) {
            return ProviderErrorKind::ContextWindowExceeded;
        }

        if has(&["rate limit", "rate_limit", "429", "too many requests"]) {
            return ProviderErrorKind::RateLimit;
        }

        if has(&[
            "401",
            "403",
            "unauthorized",
            "forbidden",
            "invalid api key",
            "invalid_api_key",
            "authentication",
        ]) {
            return ProviderErrorKind::Authentication;
        }

        if has(&["quota", "billing", "insufficient_quota", "credit balance"]) {
            return ProviderErrorKind::BudgetExhausted;
        }

        if has(&["timed out", "timeout", "deadline exceeded"]) {
            return ProviderErrorKind::Timeout;
        }

        if has(&[
            "connection",
            "network",
            "dns",
            "unreachable",
            "broken pipe",
        ]) {
            return ProviderErrorKind::Connection;
        }

        if has(&["503", "502", "service unavailable", "overloaded", "bad gateway"]) {
            return ProviderErrorKind::ServiceUnavailable;
        }

        if has(&["schema", "validation failed", "failed to parse response"]) {
            return ProviderErrorKind::ResponseValidation;
        }

        if has(&["malformed", "bad request", "400"]) {
            return ProviderErrorKind::MalformedRequest;
        }

        if has(&["invalid_request", "invalid request", "unsupported"]) {
            return ProviderErrorKind::InvalidRequest;
        }

        if has(&["500", "internal server error", "api error"]) {
            return ProviderErrorKind::Api;
        }

        ProviderErrorKind::Unknown
    }

    /// Build a typed error from a raw message
    pub fn error_from_message(message: impl Into<String>) -> ProviderError {
        let message = message.into();
        ProviderError::new(Self::infer_kind(&message), message)
    }
}
