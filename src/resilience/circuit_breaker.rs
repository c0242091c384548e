//! Persistent Per-Model Circuit Breaker
//!
//! Stops calling a model that keeps failing, then lets a single probe
//! through once it has cooled down. State lives in an injected
//! [`CircuitStateStore`], so every process sharing the store sees the same
//! circuit for a model.
//!
//! ## States
//!
//! - **Closed**: Normal operation, calls flow through
//! - **Open**: Model is failing, calls are rejected with [`CircuitOpen`]
//! - **HalfOpen**: Cooldown elapsed, calls allowed while recovery is tested
//!
//! ## Transitions
//!
//! ```text
//! Closed   --[failure_threshold consecutive failures]--> Open
//! Open     --[open_timeout elapsed, on check]----------> HalfOpen
//! HalfOpen --[success]---------------------------------> Closed
//! HalfOpen --[failure]---------------------------------> Open (fresh opened_at)
//! any      --[success | reset]-------------------------> Closed
//! ```
//!
//! Every operation is a get-then-put against the store with no
//! compare-and-swap, so two concurrent failures may both read the same
//! count. The circuit then opens at most one failure late.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::circuit_breaker as cb_constants;
use crate::storage::SharedCircuitStore;
use crate::types::{CircuitOpen, ResilienceError};

// =============================================================================
// State
// =============================================================================

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - calls flow through
    Closed,
    /// Model is failing - calls rejected immediately
    Open,
    /// Testing recovery - calls allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

impl FromStr for CircuitState {
    type Err = ResilienceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLOSED" => Ok(Self::Closed),
            "OPEN" => Ok(Self::Open),
            "HALF_OPEN" => Ok(Self::HalfOpen),
            other => Err(ResilienceError::Storage(format!(
                "Unknown circuit state '{}'",
                other
            ))),
        }
    }
}

/// Persisted circuit state for one model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitRecord {
    pub model_id: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Set exactly when `state` is [`CircuitState::Open`]
    pub opened_at: Option<DateTime<Utc>>,
    pub last_failure_reason: Option<String>,
}

impl CircuitRecord {
    /// Fresh record for a model that has never failed
    pub fn closed(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            last_failure_reason: None,
        }
    }

    /// Time since the circuit opened, if it is open
    pub fn time_open(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.opened_at
            .map(|opened_at| (now - opened_at).to_std().unwrap_or_default())
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time an open circuit rejects calls before allowing a probe
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: cb_constants::FAILURE_THRESHOLD,
            open_timeout: Duration::from_secs(cb_constants::OPEN_TIMEOUT_SECS),
        }
    }
}

// =============================================================================
// Breaker
// =============================================================================

/// Store-backed circuit breaker covering every model id.
///
/// Store faults never escape: a failed read is treated as a fresh closed
/// record and a failed write is logged.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    store: SharedCircuitStore,
}

impl CircuitBreaker {
    pub fn new(store: SharedCircuitStore, config: CircuitBreakerConfig) -> Self {
        Self { config, store }
    }

    /// Create with default threshold and timeout
    pub fn with_defaults(store: SharedCircuitStore) -> Self {
        Self::new(store, CircuitBreakerConfig::default())
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Gate a call to `model_id`.
    ///
    /// An open circuit whose timeout has elapsed moves to HALF_OPEN and
    /// admits the call.
    pub fn check_circuit(&self, model_id: &str) -> Result<(), CircuitOpen> {
        let mut record = self.load(model_id);
        if record.state != CircuitState::Open {
            return Ok(());
        }

        let now = Utc::now();
        if let Some(opened_at) = record.opened_at
            && record.time_open(now).unwrap_or_default() < self.config.open_timeout
        {
            tracing::debug!(model = model_id, "Circuit breaker: call blocked (circuit OPEN)");
            return Err(CircuitOpen {
                model_id: model_id.to_string(),
                opened_at,
                timeout: self.config.open_timeout,
            });
        }

        if record.opened_at.is_none() {
            tracing::warn!(
                model = model_id,
                "Circuit breaker: OPEN record without opened_at, probing"
            );
        }
        record.state = CircuitState::HalfOpen;
        record.opened_at = None;
        self.save(&record);

        tracing::info!(
            model = model_id,
            "Circuit breaker: transitioning to HALF_OPEN (testing recovery)"
        );
        Ok(())
    }

    /// Record a successful call; always closes the circuit
    pub fn record_success(&self, model_id: &str) {
        let mut record = self.load(model_id);
        let previous = record.state;

        if previous == CircuitState::Closed && record.consecutive_failures == 0 {
            return;
        }

        record.state = CircuitState::Closed;
        record.consecutive_failures = 0;
        record.opened_at = None;
        self.save(&record);

        if previous != CircuitState::Closed {
            tracing::info!(
                model = model_id,
                from = %previous,
                "Circuit breaker: closed (model recovered)"
            );
        }
    }

    /// Record a failed call with a short description of the failure
    pub fn record_failure(&self, model_id: &str, reason: &str) {
        let mut record = self.load(model_id);
        record.consecutive_failures = record.consecutive_failures.saturating_add(1);
        record.last_failure_reason = Some(reason.to_string());

        match record.state {
            CircuitState::Closed => {
                if record.consecutive_failures >= self.config.failure_threshold {
                    record.state = CircuitState::Open;
                    record.opened_at = Some(Utc::now());

                    tracing::warn!(
                        model = model_id,
                        failures = record.consecutive_failures,
                        timeout_secs = self.config.open_timeout.as_secs(),
                        reason,
                        "Circuit breaker: opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                record.state = CircuitState::Open;
                record.opened_at = Some(Utc::now());

                tracing::warn!(
                    model = model_id,
                    reason,
                    "Circuit breaker: re-opened after failure in HALF_OPEN"
                );
            }
            CircuitState::Open => {
                if record.opened_at.is_none() {
                    record.opened_at = Some(Utc::now());
                }
            }
        }

        self.save(&record);
    }

    /// Force the circuit closed (operator action)
    pub fn reset(&self, model_id: &str) {
        let mut record = self.load(model_id);
        record.state = CircuitState::Closed;
        record.consecutive_failures = 0;
        record.opened_at = None;
        self.save(&record);

        tracing::info!(model = model_id, "Circuit breaker: manually reset to CLOSED");
    }

    /// Current record for a model, without applying any transition
    pub fn snapshot(&self, model_id: &str) -> CircuitRecord {
        self.load(model_id)
    }

    /// Current state for a model, without applying any transition
    pub fn state(&self, model_id: &str) -> CircuitState {
        self.load(model_id).state
    }

    /// Statistics for every model the store knows about
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        let records = match self.store.list_states() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "Circuit breaker: failed to list circuit states");
                return Vec::new();
            }
        };

        let now = Utc::now();
        records
            .into_iter()
            .map(|record| CircuitBreakerStats::from_record(record, now))
            .collect()
    }

    fn load(&self, model_id: &str) -> CircuitRecord {
        self.store.get_state(model_id).unwrap_or_else(|e| {
            tracing::warn!(
                model = model_id,
                error = %e,
                "Circuit breaker: store read failed, treating as CLOSED"
            );
            CircuitRecord::closed(model_id)
        })
    }

    fn save(&self, record: &CircuitRecord) {
        if let Err(e) = self.store.put_state(record) {
            tracing::warn!(
                model = %record.model_id,
                state = %record.state,
                error = %e,
                "Circuit breaker: store write failed"
            );
        }
    }
}

/// Statistics for monitoring circuit breaker state
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub model_id: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub time_in_state: Option<Duration>,
    pub last_failure_reason: Option<String>,
}

impl CircuitBreakerStats {
    fn from_record(record: CircuitRecord, now: DateTime<Utc>) -> Self {
        Self {
            time_in_state: record.time_open(now),
            model_id: record.model_id,
            state: record.state,
            consecutive_failures: record.consecutive_failures,
            opened_at: record.opened_at,
            last_failure_reason: record.last_failure_reason,
        }
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let time_str = self
            .time_in_state
            .map(|d| format!(" for {:.1}s", d.as_secs_f64()))
            .unwrap_or_default();
        let reason_str = self
            .last_failure_reason
            .as_deref()
            .map(|r| format!(" | last: {}", r))
            .unwrap_or_default();

        format!(
            "[{}] {} | failures={}{}{}",
            self.model_id, self.state, self.consecutive_failures, time_str, reason_str
        )
    }
}
