pub mod error;
pub mod message;

pub use error::{
    CircuitOpen, ErrorSeverity, PipelineError, ProviderError, ProviderErrorKind,
    ResilienceError, Result, ResultExt,
};
pub use message::{
    ChatMessage, GenerationOptions, ModelCallRequest, ModelResponse, Role, TokenUsage,
};
