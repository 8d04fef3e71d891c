use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::actor::{strip_code_fence, ActorError, WorkerActor};
use crate::conversation::{Message, ToolRequest};
use crate::llm::{CompletionRequest, LlmClient, OutputMode, ToolSpec};
use crate::prompts::{worker_messages, worker_system_prompt};

pub struct LlmWorker {
    llm: Arc<dyn LlmClient>,
    tools: Vec<ToolSpec>,
}

impl LlmWorker {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Vec<ToolSpec>) -> Self {
        Self { llm, tools }
    }
}

#[async_trait]
impl WorkerActor for LlmWorker {
    async fn act(&self, messages: &[Message], schema_context: &str) -> Result<Message, ActorError> {
        let request = CompletionRequest {
            system: worker_system_prompt(schema_context),
            messages: worker_messages(messages),
            mode: OutputMode::ToolCalling { tools: self.tools.clone() },
        };
        let completion = self.llm.complete(&request).await?;

        if let Some(call) = completion.tool_calls.into_iter().next() {
            if !completion.content.trim().is_empty() {
                warn!(
                    event_name = "agent.worker.text_dropped",
                    tool = %call.name,
                    "worker returned text alongside a tool call; keeping the tool call"
                );
            }
            return Ok(Message::worker_tool_call(ToolRequest {
                call_id: call.id,
                tool: call.name,
                arguments: call.arguments,
            }));
        }

        if let Some(request) = embedded_tool_call(&completion.content) {
            return Ok(Message::worker_tool_call(request));
        }

        Ok(Message::worker_answer(completion.content))
    }
}

/// Recognizes a `{"name": ..., "arguments": {...}}` tool call written into the content.
fn embedded_tool_call(content: &str) -> Option<ToolRequest> {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(strip_code_fence(content)) else {
        return None;
    };
    let tool = map.get("name")?.as_str()?.to_string();
    let arguments = match map.get("arguments")? {
        Value::String(raw) => raw.clone(),
        Value::Object(_) => map.get("arguments")?.to_string(),
        _ => return None,
    };
    Some(ToolRequest { call_id: format!("call_{}", Uuid::new_v4().simple()), tool, arguments })
}
