//! Chat model capability and its OpenAI-compatible HTTP client

mod error;
mod openai;
mod types;

pub use error::{LlmError, Result};
pub use openai::{OpenAiCompatClient, DEFAULT_BASE_URL};
pub use types::{ChatMessage, ChatResponse, Role, ToolCall, ToolDefinition, Usage};

use async_trait::async_trait;

/// Given a conversation and the available tools, produce the next
/// assistant message
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, for status and logs
    fn name(&self) -> &str;

    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolDefinition])
        -> Result<ChatResponse>;
}
