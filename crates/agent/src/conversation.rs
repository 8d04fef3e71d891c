//! Per-request conversation log and the execution trace derived from it.
//!
//! The log is append-only: actors get a read-only slice of the messages and
//! return new messages, which the engine appends. Trace entries are produced
//! one per actor invocation and are never consulted for control decisions.

use serde::{Deserialize, Serialize};
use vitalis_core::flows::{ActorKind, RoutingDecision};

pub const TOOL_CALL_PLACEHOLDER: &str = "[Tool Call]";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    User,
    Router,
    Worker,
    Tool,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Router => "router",
            Self::Worker => "worker",
            Self::Tool => "tool",
        }
    }
}

impl From<ActorKind> for Origin {
    fn from(actor: ActorKind) -> Self {
        match actor {
            ActorKind::Router => Self::Router,
            ActorKind::Worker => Self::Worker,
            ActorKind::ToolExecutor => Self::Tool,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub call_id: String,
    pub tool: String,
    /// Raw JSON argument string as produced by the model.
    pub arguments: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub origin: Origin,
    pub content: String,
    pub tool_request: Option<ToolRequest>,
    /// Set on Tool messages: the call this output answers.
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { origin: Origin::User, content: content.into(), tool_request: None, tool_call_id: None }
    }

    pub fn router(decision: RoutingDecision) -> Self {
        Self {
            origin: Origin::Router,
            content: format!("Routing to: {}", decision.label()),
            tool_request: None,
            tool_call_id: None,
        }
    }

    pub fn worker_answer(content: impl Into<String>) -> Self {
        Self {
            origin: Origin::Worker,
            content: content.into(),
            tool_request: None,
            tool_call_id: None,
        }
    }

    pub fn worker_tool_call(request: ToolRequest) -> Self {
        Self {
            origin: Origin::Worker,
            content: String::new(),
            tool_request: Some(request),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            origin: Origin::Tool,
            content: content.into(),
            tool_request: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    pub fn is_final_answer(&self) -> bool {
        self.origin == Origin::Worker && self.tool_request.is_none()
    }

    /// Content shown in the trace: tool calls render as a placeholder.
    pub fn trace_content(&self) -> &str {
        if self.tool_request.is_some() && self.content.trim().is_empty() {
            TOOL_CALL_PLACEHOLDER
        } else {
            &self.content
        }
    }
}

#[derive(Clone, Debug)]
pub struct Conversation {
    messages: Vec<Message>,
    last_actor: Option<ActorKind>,
}

impl Conversation {
    pub fn new(query: impl Into<String>) -> Self {
        Self { messages: vec![Message::user(query)], last_actor: None }
    }

    pub fn append(&mut self, actor: ActorKind, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
        self.last_actor = Some(actor);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_actor(&self) -> Option<ActorKind> {
        self.last_actor
    }

    pub fn original_query(&self) -> &str {
        self.messages
            .iter()
            .find(|message| message.origin == Origin::User)
            .map(|message| message.content.as_str())
            .unwrap_or_default()
    }

    /// Most recent non-empty final answer from the Worker.
    pub fn latest_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|message| message.is_final_answer())
            .map(|message| message.content.trim())
            .find(|content| !content.is_empty())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceFlag {
    LowConfidence,
    ProtocolViolation,
    StepLimit,
    Error,
}

impl TraceFlag {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::LowConfidence => "low-confidence",
            Self::ProtocolViolation => "protocol-violation",
            Self::StepLimit => "step-limit",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: u32,
    pub actor: ActorKind,
    pub content: String,
    pub flags: Vec<TraceFlag>,
}

impl TraceEntry {
    pub fn render(&self) -> String {
        let mut line = format!("{}: {}", self.actor.trace_name(), self.content);
        for flag in &self.flags {
            line.push_str(" [");
            line.push_str(flag.tag());
            line.push(']');
        }
        line
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Trace {
    entries: Vec<TraceEntry>,
}

impl Trace {
    pub fn record(&mut self, step: u32, actor: ActorKind, content: impl Into<String>) {
        self.entries.push(TraceEntry { step, actor, content: content.into(), flags: Vec::new() });
    }

    pub fn record_flagged(
        &mut self,
        step: u32,
        actor: ActorKind,
        content: impl Into<String>,
        flag: TraceFlag,
    ) {
        self.entries.push(TraceEntry { step, actor, content: content.into(), flags: vec![flag] });
    }

    pub fn flag_last(&mut self, flag: TraceFlag) {
        if let Some(entry) = self.entries.last_mut() {
            if !entry.flags.contains(&flag) {
                entry.flags.push(flag);
            }
        }
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render(&self) -> Vec<String> {
        self.entries.iter().map(TraceEntry::render).collect()
    }
}
