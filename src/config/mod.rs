//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/llm-resilience/config.toml)
//! 3. Project config (.llm-resilience/config.toml)
//! 4. Environment variables (LLM_RESILIENCE_*)
//! 5. CLI arguments (highest priority)

mod loader;
mod types;

pub use loader::{ConfigLoader, ENV_PREFIX};
pub use types::*;
