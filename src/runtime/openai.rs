//! OpenAI chat-completions runtime
//!
//! Uses a long-lived reqwest::Client for connection pooling. Tools are sent
//! as function descriptors; tool calls come back with their arguments as a
//! JSON string.

use super::AgentRuntime;
use crate::error::FinanceError;
use crate::models::{ChatMessage, MessageRole, RuntimeReply, ToolCall, ToolSpec};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ERROR_BODY: usize = 500;

/// Reusable OpenAI client (connection-pooled)
pub struct OpenAiRuntime {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OpenAiRuntime {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FinanceError::Configuration(format!("cannot build HTTP client: {}", e)))?;

        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            api_key,
            base_url,
            model,
            temperature: 0.0,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, conversation: &[ChatMessage], tools: &[ToolSpec]) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: conversation.iter().map(WireMessage::from).collect(),
            tools: tools.iter().map(WireTool::from).collect(),
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl AgentRuntime for OpenAiRuntime {
    async fn next_step(
        &self,
        conversation: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<RuntimeReply> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.build_request(conversation, tools);

        info!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Calling OpenAI API"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("OpenAI API request failed: {}", e);
                FinanceError::Upstream(format!("OpenAI API request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            error!(%status, "OpenAI API error response: {}", body);
            return Err(FinanceError::Upstream(format!(
                "OpenAI API error ({}): {}",
                status, body
            )));
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            error!("Failed to parse OpenAI response: {}", e);
            FinanceError::Upstream(format!("OpenAI API returned an unreadable response: {}", e))
        })?;

        if let Some(usage) = &chat_response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "OpenAI usage"
            );
        }

        parse_reply(chat_response)
    }
}

/// Turn the first choice into a final answer or a batch of tool calls
fn parse_reply(response: ChatResponse) -> Result<RuntimeReply> {
    let choice = response.choices.into_iter().next().ok_or_else(|| {
        FinanceError::Upstream("OpenAI API returned no choices".to_string())
    })?;

    let message = choice.message;
    if !message.tool_calls.is_empty() {
        let calls = message
            .tool_calls
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: parse_arguments(&call.function.arguments),
            })
            .collect();

        return Ok(RuntimeReply::ToolCalls {
            content: message.content.filter(|c| !c.trim().is_empty()),
            calls,
        });
    }

    match message.content {
        Some(content) if !content.trim().is_empty() => Ok(RuntimeReply::Final(content)),
        _ => Err(FinanceError::Upstream(format!(
            "OpenAI API returned an empty message (finish_reason: {})",
            choice.finish_reason.as_deref().unwrap_or("unknown")
        ))),
    }
}

/// Arguments arrive as a JSON string. Text that is not JSON is passed on as a
/// string so the tool layer reports it as invalid parameters.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

// ===== Wire format =====

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        let role = match message.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };

        Self {
            role,
            content: message.content.clone(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: "function".to_string(),
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect(),
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

impl From<&ToolSpec> for WireTool {
    fn from(spec: &ToolSpec) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
