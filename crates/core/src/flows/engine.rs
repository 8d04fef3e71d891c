use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{
    ActorKind, NextHop, RoutingDecision, StepSignal, TransitionOutcome,
};

pub trait FlowDefinition {
    fn initial_actor(&self) -> ActorKind;
    fn transition(
        &self,
        current: ActorKind,
        signal: StepSignal,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Dispatch table for the analysis loop, keyed by (current actor, signal).
pub const ANALYSIS_TRANSITIONS: &[(ActorKind, StepSignal, NextHop)] = &[
    (ActorKind::Router, StepSignal::Continue, NextHop::Actor(ActorKind::Worker)),
    (ActorKind::Router, StepSignal::Finish, NextHop::Terminal),
    (ActorKind::Worker, StepSignal::ToolRequested, NextHop::Actor(ActorKind::ToolExecutor)),
    (ActorKind::Worker, StepSignal::Answered, NextHop::Actor(ActorKind::Router)),
    (ActorKind::ToolExecutor, StepSignal::ToolCompleted, NextHop::Actor(ActorKind::Worker)),
];

#[derive(Clone, Debug, Default)]
pub struct AnalysisFlow;

impl FlowDefinition for AnalysisFlow {
    fn initial_actor(&self) -> ActorKind {
        ActorKind::Router
    }

    fn transition(
        &self,
        current: ActorKind,
        signal: StepSignal,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        lookup(ANALYSIS_TRANSITIONS, current, signal)
    }
}

fn lookup(
    table: &[(ActorKind, StepSignal, NextHop)],
    current: ActorKind,
    signal: StepSignal,
) -> Result<TransitionOutcome, FlowTransitionError> {
    table
        .iter()
        .find(|(actor, row_signal, _)| *actor == current && *row_signal == signal)
        .map(|(_, _, to)| TransitionOutcome { from: current, signal, to: *to })
        .ok_or(FlowTransitionError::InvalidTransition { actor: current, signal })
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_actor(&self) -> ActorKind {
        self.flow.initial_actor()
    }

    pub fn apply(
        &self,
        current: ActorKind,
        signal: StepSignal,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, signal)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: ActorKind,
        signal: StepSignal,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, signal);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.correlation_id.clone(),
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.trace_name())
                    .with_metadata("signal", format!("{:?}", outcome.signal))
                    .with_metadata("to", format!("{:?}", outcome.to)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.correlation_id.clone(),
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<AnalysisFlow> {
    fn default() -> Self {
        Self::new(AnalysisFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {actor:?} on signal {signal:?}")]
    InvalidTransition { actor: ActorKind, signal: StepSignal },
}

/// How a Router answer outside the closed decision set is recovered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterFallbackPolicy {
    /// Continue when the Worker can still run within the step budget, otherwise finish.
    #[default]
    Adaptive,
    Finish,
    Abort,
}

impl RouterFallbackPolicy {
    /// `None` means the request is aborted.
    pub fn resolve(&self, worker_path_available: bool) -> Option<RoutingDecision> {
        match self {
            Self::Adaptive if worker_path_available => Some(RoutingDecision::Continue),
            Self::Adaptive | Self::Finish => Some(RoutingDecision::Finish),
            Self::Abort => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adaptive => "adaptive",
            Self::Finish => "finish",
            Self::Abort => "abort",
        }
    }
}

impl FromStr for RouterFallbackPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "adaptive" => Ok(Self::Adaptive),
            "finish" => Ok(Self::Finish),
            "abort" => Ok(Self::Abort),
            other => Err(format!(
                "unsupported router fallback `{other}` (expected adaptive|finish|abort)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::flows::engine::{
        AnalysisFlow, FlowDefinition, FlowEngine, FlowTransitionError, RouterFallbackPolicy,
    };
    use crate::flows::states::{ActorKind, NextHop, RoutingDecision, StepSignal};

    #[test]
    fn tool_round_trip_path_returns_to_router() {
        let engine = FlowEngine::new(AnalysisFlow);
        let mut actor = engine.initial_actor();
        assert_eq!(actor, ActorKind::Router);

        let signals = [
            StepSignal::Continue,
            StepSignal::ToolRequested,
            StepSignal::ToolCompleted,
            StepSignal::Answered,
        ];
        let mut visited = vec![actor];
        for signal in signals {
            let outcome = engine.apply(actor, signal).expect("transition exists");
            actor = match outcome.to {
                NextHop::Actor(next) => next,
                NextHop::Terminal => panic!("unexpected terminal after {signal:?}"),
            };
            visited.push(actor);
        }

        assert_eq!(
            visited,
            vec![
                ActorKind::Router,
                ActorKind::Worker,
                ActorKind::ToolExecutor,
                ActorKind::Worker,
                ActorKind::Router,
            ]
        );
        let finish = engine.apply(actor, StepSignal::Finish).expect("router can finish");
        assert!(finish.is_terminal());
    }

    #[test]
    fn worker_cannot_finish_the_conversation() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(ActorKind::Worker, StepSignal::Finish)
            .expect_err("only the router terminates");

        assert_eq!(
            error,
            FlowTransitionError::InvalidTransition {
                actor: ActorKind::Worker,
                signal: StepSignal::Finish
            }
        );
    }

    #[test]
    fn router_cannot_request_tools() {
        let error = AnalysisFlow
            .transition(ActorKind::Router, StepSignal::ToolRequested)
            .expect_err("router never calls tools");
        assert!(matches!(error, FlowTransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn tool_executor_always_hands_back_to_worker() {
        let outcome = AnalysisFlow
            .transition(ActorKind::ToolExecutor, StepSignal::ToolCompleted)
            .expect("tool completion");
        assert_eq!(outcome.to, NextHop::Actor(ActorKind::Worker));
    }

    #[test]
    fn adaptive_fallback_depends_on_worker_path() {
        assert_eq!(RouterFallbackPolicy::Adaptive.resolve(true), Some(RoutingDecision::Continue));
        assert_eq!(RouterFallbackPolicy::Adaptive.resolve(false), Some(RoutingDecision::Finish));
        assert_eq!(RouterFallbackPolicy::Finish.resolve(true), Some(RoutingDecision::Finish));
        assert_eq!(RouterFallbackPolicy::Abort.resolve(true), None);
    }

    #[test]
    fn fallback_policy_parses_case_insensitively() {
        assert_eq!("Adaptive".parse(), Ok(RouterFallbackPolicy::Adaptive));
        assert_eq!(" abort ".parse(), Ok(RouterFallbackPolicy::Abort));
        assert!("retry".parse::<RouterFallbackPolicy>().is_err());
    }

    #[test]
    fn transitions_emit_audit_events() {
        let engine = FlowEngine::default();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new("req-42", "orchestration-engine");

        engine
            .apply_with_audit(ActorKind::Router, StepSignal::Continue, &sink, &audit)
            .expect("router -> worker");
        let _ = engine.apply_with_audit(ActorKind::Router, StepSignal::Answered, &sink, &audit);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "flow.transition_applied");
        assert_eq!(events[0].metadata.get("from").map(String::as_str), Some("Router"));
        assert_eq!(events[1].event_type, "flow.transition_rejected");
        assert_eq!(events[1].correlation_id, "req-42");
    }
}
