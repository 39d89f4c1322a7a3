use crate::error::InvocationError;
use crate::llm::{ChatMessage, ChatModel, Role, ToolCall, ToolDefinition};
use crate::mcp::{McpError, ToolProvider};
use crate::models::ToolSpec;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default bound on model round trips per request
pub const DEFAULT_MAX_STEPS: usize = 8;

/// A bootstrapped agent: a bound model plus the tools it may call
///
/// Immutable once built. The orchestrator publishes a new handle instead of
/// changing an existing one. Backend sessions are released when the last
/// holder of a retired handle lets go of it.
pub struct AgentHandle {
    generation: u64,
    model: Arc<dyn ChatModel>,
    tools: Arc<dyn ToolProvider>,
    specs: Vec<ToolSpec>,
    definitions: Vec<ToolDefinition>,
    max_steps: usize,
    published_at: DateTime<Utc>,
}

impl AgentHandle {
    pub fn new(
        generation: u64,
        model: Arc<dyn ChatModel>,
        tools: Arc<dyn ToolProvider>,
        specs: Vec<ToolSpec>,
        max_steps: usize,
    ) -> Self {
        let definitions = specs.iter().map(ToolDefinition::from).collect();
        Self {
            generation,
            model,
            tools,
            specs,
            definitions,
            max_steps: max_steps.max(1),
            published_at: Utc::now(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.name.clone()).collect()
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    /// Run the conversation to a final assistant message
    ///
    /// Each step sends the conversation and tool definitions to the model.
    /// Requested tool calls are executed in order and their results appended
    /// as tool messages; the loop ends at the first reply without tool calls.
    pub async fn invoke(&self, messages: Vec<ChatMessage>) -> Result<String, InvocationError> {
        let mut conversation = messages;

        for step in 1..=self.max_steps {
            let response = self.model.chat(&conversation, &self.definitions).await?;
            let message = response.message;

            if message.tool_calls.is_empty() {
                debug!(generation = self.generation, steps = step, "Agent finished");
                return Ok(message.content);
            }

            debug!(
                generation = self.generation,
                step = step,
                tool_calls = message.tool_calls.len(),
                "Model requested tools"
            );

            let calls = message.tool_calls.clone();
            conversation.push(ChatMessage {
                role: Role::Assistant,
                ..message
            });

            for call in &calls {
                let content = self.run_tool(call).await?;
                conversation.push(ChatMessage::tool_result(&call.id, content));
            }
        }

        Err(InvocationError::StepLimit(self.max_steps))
    }

    /// Execute one tool call. Problems the model can correct (bad JSON,
    /// unknown tool, tool-reported errors) go back to it as text; transport
    /// failures abort the request.
    async fn run_tool(&self, call: &ToolCall) -> Result<String, InvocationError> {
        let arguments = match parse_arguments(&call.arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Model sent malformed tool arguments");
                return Ok(format!("Error: invalid JSON arguments: {}", e));
            }
        };

        match self.tools.call_tool(&call.name, arguments).await {
            Ok(output) if output.is_error => Ok(format!("Error: {}", output.text)),
            Ok(output) => Ok(output.text),
            Err(McpError::UnknownTool(name)) => {
                warn!(tool = %name, "Model called an unknown tool");
                Ok(format!("Error: {} is not a valid tool", name))
            }
            Err(source) => Err(InvocationError::Tool {
                tool: call.name.clone(),
                source,
            }),
        }
    }
}

impl Drop for AgentHandle {
    fn drop(&mut self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let tools = self.tools.clone();
        let generation = self.generation;
        runtime.spawn(async move {
            tools.close().await;
            debug!(generation = generation, "Released tool sessions of retired agent");
        });
    }
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("generation", &self.generation)
            .field("model", &self.model.name())
            .field("tools", &self.tool_names())
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

fn parse_arguments(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw)
}
