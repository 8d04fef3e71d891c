use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptRole {
    User,
    Assistant,
    Tool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
}

impl PromptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: PromptRole::User, content: content.into(), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_call(call: ToolCall) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: String::new(),
            tool_calls: vec![call],
            tool_call_id: None,
        }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// A tool the model may call, described by a JSON schema for its arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OutputMode {
    /// The reply must be a JSON object matching `schema`.
    Structured { name: String, schema: Value },
    /// Free text, optionally replaced by a call to one of `tools`.
    ToolCalling { tools: Vec<ToolSpec> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<PromptMessage>,
    pub mode: OutputMode,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), tool_calls: Vec::new() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("language model rejected credentials: {0}")]
    Auth(String),
    #[error("language model rate limited the request: {0}")]
    RateLimited(String),
    #[error("language model call timed out: {0}")]
    Timeout(String),
    #[error("language model provider error (status {status}): {message}")]
    Provider { status: u16, message: String },
    #[error("language model response was malformed: {0}")]
    MalformedResponse(String),
    #[error("language model transport failure: {0}")]
    Transport(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited(_) | Self::Timeout(_) | Self::Transport(_) => true,
            Self::Provider { status, .. } => *status >= 500,
            Self::Auth(_) | Self::MalformedResponse(_) => false,
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Auth(_) => "llm_auth",
            Self::RateLimited(_) => "llm_rate_limited",
            Self::Timeout(_) => "llm_timeout",
            Self::Provider { .. } => "llm_provider",
            Self::MalformedResponse(_) => "llm_malformed_response",
            Self::Transport(_) => "llm_transport",
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;
}
