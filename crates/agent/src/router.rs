use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use vitalis_core::flows::RoutingDecision;

use crate::actor::{strip_code_fence, ActorError, RouterActor, RouterVerdict};
use crate::conversation::Message;
use crate::llm::{Completion, CompletionRequest, LlmClient, OutputMode};
use crate::prompts::{router_output_schema, router_system_prompt, router_transcript, ROUTER_OUTPUT_NAME};

/// Parses a Router answer into the closed decision set.
///
/// Accepts `{"next_actor": "<label>"}`, a JSON string, a bare label, or a
/// `Routing to: <label>` line. Unknown labels yield `None`.
pub fn parse_routing_decision(raw: &str) -> Option<RoutingDecision> {
    let body = strip_code_fence(raw);
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map.get("next_actor").and_then(Value::as_str).and_then(parse_label),
        Ok(Value::String(label)) => parse_label(&label),
        Ok(_) => None,
        Err(_) => {
            let label = body.strip_prefix("Routing to:").unwrap_or(body);
            parse_label(label)
        }
    }
}

fn parse_label(label: &str) -> Option<RoutingDecision> {
    let normalized = label.trim().trim_matches(|c| c == '"' || c == '\'' || c == '.');
    match normalized.to_ascii_lowercase().as_str() {
        "data_analyst" | "worker" | "continue" => Some(RoutingDecision::Continue),
        "finish" | "done" => Some(RoutingDecision::Finish),
        _ => None,
    }
}

pub struct LlmRouter {
    llm: Arc<dyn LlmClient>,
    parse_attempts: u32,
}

impl LlmRouter {
    pub fn new(llm: Arc<dyn LlmClient>, parse_attempts: u32) -> Self {
        Self { llm, parse_attempts: parse_attempts.max(1) }
    }
}

#[async_trait]
impl RouterActor for LlmRouter {
    async fn decide(&self, messages: &[Message]) -> Result<RouterVerdict, ActorError> {
        let request = CompletionRequest {
            system: router_system_prompt().to_string(),
            messages: router_transcript(messages),
            mode: OutputMode::Structured {
                name: ROUTER_OUTPUT_NAME.to_string(),
                schema: router_output_schema(),
            },
        };

        let mut raw = String::new();
        for attempt in 1..=self.parse_attempts {
            let completion = self.llm.complete(&request).await?;
            raw = answer_text(completion);
            if let Some(decision) = parse_routing_decision(&raw) {
                debug!(
                    event_name = "agent.router.decided",
                    attempt,
                    decision = decision.label(),
                    "router decision parsed"
                );
                return Ok(RouterVerdict::Decision(decision));
            }
            warn!(
                event_name = "agent.router.unparseable",
                attempt,
                max_attempts = self.parse_attempts,
                raw = %raw,
                "router answer outside decision set"
            );
        }

        Ok(RouterVerdict::Violation { raw })
    }
}

// Some providers return structured output as a tool call instead of content.
fn answer_text(completion: Completion) -> String {
    if completion.content.trim().is_empty() {
        if let Some(call) = completion.tool_calls.into_iter().next() {
            return call.arguments;
        }
    }
    completion.content
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use vitalis_core::flows::RoutingDecision;

    use super::{parse_routing_decision, LlmRouter};
    use crate::actor::{RouterActor, RouterVerdict};
    use crate::conversation::Message;
    use crate::llm::{Completion, CompletionRequest, LlmClient, LlmError};

    struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<Completion, LlmError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<Result<Completion, LlmError>>) -> Self {
            Self { replies: Mutex::new(replies.into()), calls: Mutex::new(0) }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().expect("calls lock")
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, LlmError> {
            *self.calls.lock().expect("calls lock") += 1;
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or_else(|| Ok(Completion::text("")))
        }
    }

    #[test]
    fn labels_map_onto_the_closed_decision_set() {
        assert_eq!(parse_routing_decision(r#"{"next_actor": "Data_Analyst"}"#), Some(RoutingDecision::Continue));
        assert_eq!(parse_routing_decision("FINISH"), Some(RoutingDecision::Finish));
        assert_eq!(parse_routing_decision("```json\n{\"next_actor\":\"done\"}\n```"), Some(RoutingDecision::Finish));
        assert_eq!(parse_routing_decision("Routing to: Worker"), Some(RoutingDecision::Continue));
        assert_eq!(parse_routing_decision(r#""continue""#), Some(RoutingDecision::Continue));
    }

    #[test]
    fn unknown_labels_are_not_defaulted() {
        assert_eq!(parse_routing_decision(r#"{"next_actor": "Supervisor"}"#), None);
        assert_eq!(parse_routing_decision("I think we are done here"), None);
        assert_eq!(parse_routing_decision("42"), None);
    }

    #[tokio::test]
    async fn router_retries_until_answer_parses() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(Completion::text("Let me think about it")),
            Ok(Completion::text(r#"{"next_actor": "FINISH"}"#)),
        ]));
        let router = LlmRouter::new(llm.clone(), 2);

        let verdict = router.decide(&[Message::user("q")]).await.expect("verdict");
        assert_eq!(verdict, RouterVerdict::Decision(RoutingDecision::Finish));
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn exhausted_attempts_report_a_violation() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(Completion::text("maybe")),
            Ok(Completion::text("perhaps")),
        ]));
        let router = LlmRouter::new(llm, 2);

        let verdict = router.decide(&[Message::user("q")]).await.expect("verdict");
        assert_eq!(verdict, RouterVerdict::Violation { raw: "perhaps".to_string() });
    }

    #[tokio::test]
    async fn collaborator_errors_propagate() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err(LlmError::Auth("bad key".to_string()))]));
        let router = LlmRouter::new(llm, 3);

        assert!(router.decide(&[Message::user("q")]).await.is_err());
    }
}
