//! Request and response shapes exchanged with providers.

use serde::{Deserialize, Serialize};

use crate::constants::generation as gen_constants;

/// Chat role of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// Single chat-style message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Sampling options forwarded to the provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature (0.0 = deterministic)
    pub temperature: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: gen_constants::DEFAULT_MAX_TOKENS,
            temperature: gen_constants::DEFAULT_TEMPERATURE,
        }
    }
}

/// One call to one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCallRequest {
    pub model_id: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ModelCallRequest {
    pub fn new(
        model_id: impl Into<String>,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            messages: messages.to_vec(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        }
    }

    /// Same request retargeted at another model
    pub fn for_model(&self, model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..self.clone()
        }
    }
}

/// Token usage reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Successful provider response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Generated text
    pub content: String,
    /// Model that produced the text
    pub model_id: String,
    #[serde(default)]
    pub usage: TokenUsage,
}

impl ModelResponse {
    /// Response with content only (usage unknown)
    pub fn text(model_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model_id: model_id.into(),
            usage: TokenUsage::default(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_copies_options() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let options = GenerationOptions {
            max_tokens: 256,
            temperature: 0.2,
        };
        let request = ModelCallRequest::new("gpt-4o", &messages, &options);
        assert_eq!(request.max_tokens, 256);
        assert_eq!(request.messages.len(), 2);

        let retargeted = request.for_model("claude");
        assert_eq!(retargeted.model_id, "claude");
        assert_eq!(retargeted.messages, request.messages);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::user("x")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"x"}"#);
    }
}
