use super::error::{LlmError, Result};
use super::types::{ChatMessage, ChatResponse, Role, ToolCall, ToolDefinition, Usage};
use super::ChatModel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Groq's OpenAI-compatible API
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Client for any `/chat/completions` endpoint speaking the OpenAI schema
#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.model
    }

    #[tracing::instrument(level = "debug", skip_all, fields(model = %self.model))]
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        let request = CompletionRequest::new(&self.model, messages, tools);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = serde_json::from_str(&body)?;
        let response = ChatResponse::try_from(parsed)?;
        debug!(
            finish_reason = %response.finish_reason,
            tool_calls = response.message.tool_calls.len(),
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "Model replied"
        );
        Ok(response)
    }
}

// Wire format

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

impl CompletionRequest {
    fn new(model: &str, messages: &[ChatMessage], tools: &[ToolDefinition]) -> Self {
        Self {
            model: model.to_string(),
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: tools.iter().map(WireTool::from).collect(),
            tool_choice: (!tools.is_empty()).then_some("auto"),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    r#type: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&ToolDefinition> for WireTool {
    fn from(t: &ToolDefinition) -> Self {
        Self {
            r#type: "function",
            function: WireFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    #[serde(default)]
    function: WireFunctionCall,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireFunctionCall {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

impl From<&ChatMessage> for WireMessage {
    fn from(m: &ChatMessage) -> Self {
        // Tool results must carry content even when the tool printed nothing
        let content = match m.role {
            Role::Tool => Some(m.content.clone()),
            _ => Some(m.content.clone()).filter(|s| !s.is_empty()),
        };
        Self {
            role: m.role.as_str(),
            content,
            tool_calls: m
                .tool_calls
                .iter()
                .map(|tc| WireToolCall {
                    id: tc.id.clone(),
                    r#type: function_type(),
                    function: WireFunctionCall {
                        name: tc.name.clone(),
                        arguments: tc.arguments.clone(),
                    },
                })
                .collect(),
            tool_call_id: m.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

impl TryFrom<CompletionResponse> for ChatResponse {
    type Error = LlmError;

    fn try_from(v: CompletionResponse) -> Result<Self> {
        let choice = v
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ResponseFormat("response has no choices".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ChatResponse {
            message: ChatMessage {
                role: Role::Assistant,
                content: choice.message.content.unwrap_or_default(),
                tool_calls,
                tool_call_id: None,
            },
            usage: v.usage.unwrap_or_default(),
            finish_reason: choice
                .finish_reason
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}
