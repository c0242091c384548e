//! Provider Call Interface
//!
//! The single outbound capability the resilience layer consumes: "generate
//! text from chat messages for a model id". Adapters for concrete vendors
//! live outside this crate and report failures as typed
//! [`ProviderError`]s (see [`ProviderError::from_http_status`] and
//! [`crate::resilience::ErrorClassifier::infer_kind`] for raw failures).

mod timeout;

use std::sync::Arc;

use async_trait::async_trait;

pub use timeout::TimeoutProvider;

use crate::types::{ModelCallRequest, ModelResponse, ProviderError};

/// Injected model invocation
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Invoke `request.model_id` once; no retries
    async fn call(&self, request: &ModelCallRequest) -> Result<ModelResponse, ProviderError>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

pub type SharedProvider = Arc<dyn ModelProvider>;

#[async_trait]
impl<P: ModelProvider + ?Sized> ModelProvider for Arc<P> {
    async fn call(&self, request: &ModelCallRequest) -> Result<ModelResponse, ProviderError> {
        (**self).call(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
