//! termi-llm: model access for the termi shell assistant
//!
//! Provides:
//! - Model configuration (explicit value, env overrides)
//! - Streaming chat-completions client behind the [`ModelClient`] trait
//! - Conversation message types
//! - Error classification for retries

pub mod client;
pub mod config;
pub mod error;
pub mod message;

pub use client::{fragments_from_bytes, FragmentStream, ModelClient, OpenAiClient};
pub use config::{ModelConfig, RetryConfig};
pub use error::{LlmError, LlmErrorKind};
pub use message::{ChatMessage, Role, ToolCall};
