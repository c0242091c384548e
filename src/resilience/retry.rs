//! Retry Engine
//!
//! Bounded retry with exponential backoff around any fallible operation,
//! for both async and blocking callers. The backoff schedule is produced by
//! [`RetryPolicy`] (a `backon` backoff builder); `backon` drives the loop.
//!
//! Attempt `k` (0-indexed) that fails with a retryable error is followed by
//! a sleep of `min(base_delay * exponential_base^k, max_delay)`, scaled by a
//! uniform factor in `[0.5, 1.5]` when jitter is on. After `max_attempts`
//! failures the last error is returned wrapped in [`RetryError::Exhausted`].
//! Errors outside the retryable set are returned at once as
//! [`RetryError::NotRetryable`].

use std::collections::HashSet;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{BackoffBuilder, BlockingRetryable, Retryable};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::retry as retry_constants;
use crate::types::{ProviderError, ProviderErrorKind};

// =============================================================================
// Policy
// =============================================================================

/// Backoff schedule for one retry run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt (seconds)
    pub base_delay_secs: f64,
    /// Cap on any single delay (seconds)
    pub max_delay_secs: f64,
    /// Growth factor between consecutive delays
    pub exponential_base: f64,
    /// Randomize each delay within [0.5x, 1.5x]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: retry_constants::DEFAULT_MAX_ATTEMPTS,
            base_delay_secs: retry_constants::DEFAULT_BASE_DELAY_SECS,
            max_delay_secs: retry_constants::DEFAULT_MAX_DELAY_SECS,
            exponential_base: retry_constants::DEFAULT_EXPONENTIAL_BASE,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy for rate-limited calls
    pub fn rate_limit() -> Self {
        Self {
            max_attempts: retry_constants::RATE_LIMIT_MAX_ATTEMPTS,
            base_delay_secs: retry_constants::RATE_LIMIT_BASE_DELAY_SECS,
            ..Self::default()
        }
    }

    /// Policy for timeouts and connection failures
    pub fn network() -> Self {
        Self {
            max_attempts: retry_constants::NETWORK_MAX_ATTEMPTS,
            base_delay_secs: retry_constants::NETWORK_BASE_DELAY_SECS,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay_secs = base_delay.as_secs_f64();
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay_secs = max_delay.as_secs_f64();
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn base_delay(&self) -> Duration {
        saturating_secs(self.base_delay_secs)
    }

    pub fn max_delay(&self) -> Duration {
        saturating_secs(self.max_delay_secs)
    }

    /// Attempts actually made; a zero budget still makes one call
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Unjittered delay after failed attempt `attempt` (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.base_delay_secs.max(0.0) * self.exponential_base.powi(exponent);
        let capped = raw.min(self.max_delay_secs.max(0.0));
        if capped.is_nan() {
            return self.max_delay();
        }
        saturating_secs(capped)
    }

    /// Check the policy can drive a retry loop
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if !(self.base_delay_secs >= 0.0 && self.base_delay_secs.is_finite()) {
            return Err(format!(
                "base_delay_secs must be a non-negative number, got {}",
                self.base_delay_secs
            ));
        }
        if !(self.max_delay_secs >= self.base_delay_secs && self.max_delay_secs.is_finite()) {
            return Err(format!(
                "max_delay_secs ({}) must be at least base_delay_secs ({})",
                self.max_delay_secs, self.base_delay_secs
            ));
        }
        if !(self.exponential_base >= 1.0 && self.exponential_base.is_finite()) {
            return Err(format!(
                "exponential_base must be >= 1.0, got {}",
                self.exponential_base
            ));
        }
        Ok(())
    }
}

/// Delay sequence for one retry run: `max_attempts - 1` entries
#[derive(Debug, Clone)]
pub struct PolicyBackoff {
    policy: RetryPolicy,
    next_attempt: u32,
}

impl Iterator for PolicyBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.next_attempt + 1 >= self.policy.effective_attempts() {
            return None;
        }
        let delay = self.policy.delay_for_attempt(self.next_attempt);
        self.next_attempt += 1;
        Some(if self.policy.jitter {
            apply_jitter(delay)
        } else {
            delay
        })
    }
}

impl BackoffBuilder for RetryPolicy {
    type Backoff = PolicyBackoff;

    fn build(self) -> Self::Backoff {
        PolicyBackoff {
            policy: self,
            next_attempt: 0,
        }
    }
}

/// Scale a delay by a uniform factor in [0.5, 1.5]
fn apply_jitter(delay: Duration) -> Duration {
    let factor = rand::rng().random_range(
        retry_constants::JITTER_MIN_FACTOR..=retry_constants::JITTER_MAX_FACTOR,
    );
    saturating_secs(delay.as_secs_f64() * factor)
}

/// Seconds to a `Duration`, clamped to `[0, Duration::MAX]`
fn saturating_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

// =============================================================================
// Errors
// =============================================================================

/// Anything with a type tag the retry engine can match against
pub trait ErrorType {
    type Type: Copy + Eq + Hash + Debug;

    fn error_type(&self) -> Self::Type;
}

impl ErrorType for ProviderError {
    type Type = ProviderErrorKind;

    fn error_type(&self) -> ProviderErrorKind {
        self.kind
    }
}

/// Why a retry run gave up
#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    /// Every attempt failed with a retryable error
    #[error("retries exhausted after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },
    /// Failed with an error outside the retryable set
    #[error(transparent)]
    NotRetryable(E),
}

impl<E: std::error::Error + 'static> RetryError<E> {
    /// The underlying error from the last attempt
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { source, .. } => source,
            Self::NotRetryable(err) => err,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

// =============================================================================
// Observer
// =============================================================================

/// Notified before each backoff sleep
pub trait RetryObserver<E>: Send + Sync {
    /// `attempt` is the 0-indexed attempt that just failed
    fn on_retry(&self, attempt: u32, error: &E, delay: Duration);
}

impl<E, F> RetryObserver<E> for F
where
    F: Fn(u32, &E, Duration) + Send + Sync,
{
    fn on_retry(&self, attempt: u32, error: &E, delay: Duration) {
        self(attempt, error, delay)
    }
}

// =============================================================================
// Retry Loops
// =============================================================================

/// Retry an async operation; only the backoff sleep suspends between attempts
pub async fn retry_async<T, E, F, Fut>(
    mut operation: F,
    retryable: &HashSet<E::Type>,
    policy: &RetryPolicy,
    observer: Option<&dyn RetryObserver<E>>,
) -> std::result::Result<T, RetryError<E>>
where
    E: ErrorType + std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let attempts = AtomicU32::new(0);

    let attempt_once = || {
        attempts.fetch_add(1, Ordering::Relaxed);
        operation()
    };

    let result = Retryable::retry(attempt_once, *policy)
        .when(|err: &E| retryable.contains(&err.error_type()))
        .notify(|err: &E, delay: Duration| {
            notify_retry(observer, &attempts, err, delay);
        })
        .await;

    finish(result, retryable, attempts.load(Ordering::Relaxed))
}

/// Retry a blocking operation, sleeping the calling thread between attempts
pub fn retry_blocking<T, E, F>(
    mut operation: F,
    retryable: &HashSet<E::Type>,
    policy: &RetryPolicy,
    observer: Option<&dyn RetryObserver<E>>,
) -> std::result::Result<T, RetryError<E>>
where
    E: ErrorType + std::error::Error + 'static,
    F: FnMut() -> std::result::Result<T, E>,
{
    let attempts = AtomicU32::new(0);

    let attempt_once = || {
        attempts.fetch_add(1, Ordering::Relaxed);
        operation()
    };

    let result = BlockingRetryable::retry(attempt_once, *policy)
        .sleep(std::thread::sleep)
        .when(|err: &E| retryable.contains(&err.error_type()))
        .notify(|err: &E, delay: Duration| {
            notify_retry(observer, &attempts, err, delay);
        })
        .call();

    finish(result, retryable, attempts.load(Ordering::Relaxed))
}

fn notify_retry<E: ErrorType>(
    observer: Option<&dyn RetryObserver<E>>,
    attempts: &AtomicU32,
    err: &E,
    delay: Duration,
) {
    let attempt = attempts.load(Ordering::Relaxed).saturating_sub(1);
    tracing::debug!(
        attempt,
        error_type = ?err.error_type(),
        delay_ms = delay.as_millis() as u64,
        "Retrying after backoff"
    );
    if let Some(observer) = observer {
        observer.on_retry(attempt, err, delay);
    }
}

fn finish<T, E>(
    result: std::result::Result<T, E>,
    retryable: &HashSet<E::Type>,
    attempts: u32,
) -> std::result::Result<T, RetryError<E>>
where
    E: ErrorType + std::error::Error + 'static,
{
    result.map_err(|err| {
        if retryable.contains(&err.error_type()) {
            RetryError::Exhausted {
                attempts,
                source: err,
            }
        } else {
            RetryError::NotRetryable(err)
        }
    })
}
