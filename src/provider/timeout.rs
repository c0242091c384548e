use std::time::Duration;

use async_trait::async_trait;

use super::ModelProvider;
use crate::constants::network as net_constants;
use crate::types::{ModelCallRequest, ModelResponse, ProviderError};

/// Bounds every call of the wrapped provider by a deadline.
///
/// An elapsed deadline becomes a `timeout` provider error, which the
/// classifier treats as RECOVERABLE.
pub struct TimeoutProvider<P> {
    inner: P,
    timeout: Duration,
}

impl<P: ModelProvider> TimeoutProvider<P> {
    pub fn new(inner: P, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Wrap with the default provider request timeout
    pub fn with_default_timeout(inner: P) -> Self {
        Self::new(inner, Duration::from_secs(net_constants::DEFAULT_TIMEOUT_SECS))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl<P: ModelProvider> ModelProvider for TimeoutProvider<P> {
    async fn call(&self, request: &ModelCallRequest) -> Result<ModelResponse, ProviderError> {
        match tokio::time::timeout(self.timeout, self.inner.call(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    provider = self.inner.name(),
                    model = %request.model_id,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Provider call timed out"
                );
                Err(ProviderError::timeout(format!(
                    "Request timed out after {:?}",
                    self.timeout
                ))
                .model(&request.model_id))
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, GenerationOptions, ProviderErrorKind};

    struct SlowProvider {
        delay: Duration,
    }

    #[async_trait]
    impl ModelProvider for SlowProvider {
        async fn call(&self, request: &ModelCallRequest) -> Result<ModelResponse, ProviderError> {
            tokio::time::sleep(self.delay).await;
            Ok(ModelResponse::text(&request.model_id, "late but fine"))
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn request() -> ModelCallRequest {
        ModelCallRequest::new(
            "m",
            &[ChatMessage::user("hi")],
            &GenerationOptions::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_deadline_is_timeout_error() {
        let provider = TimeoutProvider::new(
            SlowProvider {
                delay: Duration::from_secs(10),
            },
            Duration::from_secs(1),
        );

        let err = provider.call(&request()).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Timeout);
        assert_eq!(err.model_id.as_deref(), Some("m"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_call_passes_through() {
        let provider = TimeoutProvider::new(
            SlowProvider {
                delay: Duration::from_millis(10),
            },
            Duration::from_secs(1),
        );

        let response = provider.call(&request()).await.unwrap();
        assert_eq!(response.content, "late but fine");
        assert_eq!(provider.name(), "slow");
    }
}
