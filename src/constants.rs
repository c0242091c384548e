//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Circuit breaker constants
pub mod circuit_breaker {
    /// Consecutive failures before opening the circuit
    pub const FAILURE_THRESHOLD: u32 = 5;

    /// Seconds an open circuit rejects calls before allowing a probe
    pub const OPEN_TIMEOUT_SECS: u64 = 300;
}

/// Retry policy defaults
pub mod retry {
    /// Default policy: attempts per retry run
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    /// Default policy: first backoff delay (seconds)
    pub const DEFAULT_BASE_DELAY_SECS: f64 = 1.0;
    /// Upper bound on any single backoff delay (seconds)
    pub const DEFAULT_MAX_DELAY_SECS: f64 = 60.0;
    /// Backoff multiplier
    pub const DEFAULT_EXPONENTIAL_BASE: f64 = 2.0;

    /// Rate-limit policy: attempts per retry run
    pub const RATE_LIMIT_MAX_ATTEMPTS: u32 = 3;
    /// Rate-limit policy: first backoff delay (seconds)
    pub const RATE_LIMIT_BASE_DELAY_SECS: f64 = 2.0;

    /// Network policy: attempts per retry run
    pub const NETWORK_MAX_ATTEMPTS: u32 = 2;
    /// Network policy: first backoff delay (seconds)
    pub const NETWORK_BASE_DELAY_SECS: f64 = 1.0;

    /// Jitter multiplies each delay by a factor drawn from this range
    pub const JITTER_MIN_FACTOR: f64 = 0.5;
    pub const JITTER_MAX_FACTOR: f64 = 1.5;
}

/// Generation defaults applied when the caller passes none
pub mod generation {
    pub const DEFAULT_MAX_TOKENS: u32 = 4096;
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;
}

/// Provider call constants
pub mod network {
    /// Default provider request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
}

/// Degraded-service messages returned instead of raising
pub mod messages {
    pub const TEMPORARILY_UNAVAILABLE: &str =
        "is temporarily unavailable after repeated failures. Please try again in a few minutes.";
    pub const HIGH_DEMAND: &str =
        "The AI service is experiencing high demand right now. Please try again in a few moments.";
    pub const REQUEST_INVALID: &str = "could not process this request";
    pub const SERVICE_UNAVAILABLE: &str =
        "The AI service is currently unavailable. Please try again later.";
}
