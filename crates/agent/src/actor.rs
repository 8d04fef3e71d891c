use async_trait::async_trait;
use thiserror::Error;
use vitalis_core::flows::RoutingDecision;

use crate::conversation::Message;
use crate::llm::LlmError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActorError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("actor unavailable: {0}")]
    Unavailable(String),
}

impl ActorError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Llm(error) => error.error_class(),
            Self::Unavailable(_) => "actor_unavailable",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouterVerdict {
    Decision(RoutingDecision),
    /// The Router answered with something outside the closed decision set.
    Violation { raw: String },
}

#[async_trait]
pub trait RouterActor: Send + Sync {
    async fn decide(&self, messages: &[Message]) -> Result<RouterVerdict, ActorError>;
}

#[async_trait]
pub trait WorkerActor: Send + Sync {
    /// Returns one Worker message: a tool request or final content, never both.
    async fn act(&self, messages: &[Message], schema_context: &str) -> Result<Message, ActorError>;
}

/// Strips a surrounding markdown code fence, if any.
pub(crate) fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.strip_suffix("```").unwrap_or(body).trim()
}
