//! Resilience Metrics Collection
//!
//! Lock-free counters describing how the resilience layer has been
//! serving requests. Shared by every concurrent call through one
//! orchestrator.
//!
//! ## Usage
//!
//! ```ignore
//! let metrics = orchestrator.metrics();
//! let snapshot = metrics.snapshot();
//! println!("{}", snapshot.summary());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::types::{ErrorSeverity, TokenUsage};

pub type SharedMetrics = Arc<ResilienceMetrics>;

// =============================================================================
// Metrics Collector
// =============================================================================

/// Thread-safe counters for orchestrated calls
pub struct ResilienceMetrics {
    start_time: Instant,
    /// Top-level generation requests
    requests: AtomicU64,
    /// Provider invocations, including retries
    provider_calls: AtomicU64,
    /// Requests answered with model output
    successes: AtomicU64,
    /// Backoff sleeps taken
    retries: AtomicU64,
    /// Hops to a fallback model
    fallbacks: AtomicU64,
    /// Calls short-circuited by an open circuit
    circuit_rejections: AtomicU64,
    /// Requests that ended in a FATAL error
    fatal_errors: AtomicU64,
    /// Requests answered with a degraded message
    degraded_responses: AtomicU64,
    /// Provider failures by severity: fatal, recoverable, skippable, degraded
    failures_by_severity: [AtomicU64; 4],
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_ms: u64,
    pub requests: u64,
    pub provider_calls: u64,
    pub successes: u64,
    pub retries: u64,
    pub fallbacks: u64,
    pub circuit_rejections: u64,
    pub fatal_errors: u64,
    pub degraded_responses: u64,
    pub fatal_failures: u64,
    pub recoverable_failures: u64,
    pub skippable_failures: u64,
    pub degraded_failures: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Default for ResilienceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilienceMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            requests: AtomicU64::new(0),
            provider_calls: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            circuit_rejections: AtomicU64::new(0),
            fatal_errors: AtomicU64::new(0),
            degraded_responses: AtomicU64::new(0),
            failures_by_severity: Default::default(),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_call(&self) {
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request served with model output
    pub fn record_success(&self, usage: &TokenUsage) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.input_tokens
            .fetch_add(u64::from(usage.input_tokens), Ordering::Relaxed);
        self.output_tokens
            .fetch_add(u64::from(usage.output_tokens), Ordering::Relaxed);
    }

    pub fn record_failure(&self, severity: ErrorSeverity) {
        let slot = match severity {
            ErrorSeverity::Fatal => 0,
            ErrorSeverity::Recoverable => 1,
            ErrorSeverity::Skippable => 2,
            ErrorSeverity::Degraded => 3,
        };
        self.failures_by_severity[slot].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_rejection(&self) {
        self.circuit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fatal(&self) {
        self.fatal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_degraded(&self) {
        self.degraded_responses.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        MetricsSnapshot {
            uptime_ms: self.start_time.elapsed().as_millis() as u64,
            requests: load(&self.requests),
            provider_calls: load(&self.provider_calls),
            successes: load(&self.successes),
            retries: load(&self.retries),
            fallbacks: load(&self.fallbacks),
            circuit_rejections: load(&self.circuit_rejections),
            fatal_errors: load(&self.fatal_errors),
            degraded_responses: load(&self.degraded_responses),
            fatal_failures: load(&self.failures_by_severity[0]),
            recoverable_failures: load(&self.failures_by_severity[1]),
            skippable_failures: load(&self.failures_by_severity[2]),
            degraded_failures: load(&self.failures_by_severity[3]),
            input_tokens: load(&self.input_tokens),
            output_tokens: load(&self.output_tokens),
        }
    }
}

impl MetricsSnapshot {
    /// Share of requests answered with model output
    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        self.successes as f64 / self.requests as f64
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "requests={} ok={} degraded={} fatal={} | calls={} retries={} fallbacks={} rejected={} | tokens={}/{}",
            self.requests,
            self.successes,
            self.degraded_responses,
            self.fatal_errors,
            self.provider_calls,
            self.retries,
            self.fallbacks,
            self.circuit_rejections,
            self.input_tokens,
            self.output_tokens,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = ResilienceMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_provider_call();
        metrics.record_failure(ErrorSeverity::Recoverable);
        metrics.record_retry();
        metrics.record_provider_call();
        metrics.record_success(&TokenUsage {
            input_tokens: 100,
            output_tokens: 20,
        });
        metrics.record_fatal();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.provider_calls, 2);
        assert_eq!(snapshot.recoverable_failures, 1);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.fatal_errors, 1);
        assert_eq!(snapshot.input_tokens, 100);
        assert_eq!(snapshot.output_tokens, 20);
        assert!((snapshot.success_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_format() {
        let snapshot = MetricsSnapshot {
            requests: 3,
            successes: 2,
            degraded_responses: 1,
            provider_calls: 5,
            fallbacks: 1,
            ..Default::default()
        };
        assert_eq!(
            snapshot.summary(),
            "requests=3 ok=2 degraded=1 fatal=0 | calls=5 retries=0 fallbacks=1 rejected=0 | tokens=0/0"
        );
        assert_eq!(MetricsSnapshot::default().success_rate(), 0.0);
    }
}
