//! The bounded Router → Worker → Tool-Executor loop.
//!
//! The engine owns the conversation for one request. Each iteration invokes
//! exactly one actor, appends its message, records one trace entry and looks
//! the next actor up in the transition table. The loop ends on a Router
//! `Finish`, when the step budget is spent, on cancellation or deadline, when
//! a collaborator fails, or when an unparseable Router answer is configured
//! to abort.
//!
//! Cancellation and the deadline are observed between steps only. An actor
//! call that has started is never dropped, so every invocation leaves exactly
//! one trace entry. Per-call time limits belong to the collaborators.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vitalis_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use vitalis_core::flows::{
    ActorKind, AnalysisFlow, FlowEngine, NextHop, RouterFallbackPolicy, StepSignal,
};

use crate::actor::{ActorError, RouterActor, RouterVerdict, WorkerActor};
use crate::conversation::{Conversation, Message, Origin, Trace, TraceFlag};
use crate::tools::ToolExecutor;

pub const FALLBACK_ANSWER: &str = "No response generated.";
pub const FAILURE_ANSWER: &str =
    "I'm sorry, the analysis could not be completed because a required service failed. Please try again later.";
const ENGINE_ACTOR: &str = "orchestration-engine";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Completed,
    StepLimitReached,
    Cancelled,
    CollaboratorFailure,
    RouterProtocolViolation,
}

impl EngineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::StepLimitReached => "step_limit_reached",
            Self::Cancelled => "cancelled",
            Self::CollaboratorFailure => "collaborator_failure",
            Self::RouterProtocolViolation => "router_protocol_violation",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub max_steps: u32,
    pub cancel: CancellationToken,
    pub deadline: Option<Instant>,
    pub correlation_id: String,
}

impl RunOptions {
    pub fn new(max_steps: u32, correlation_id: impl Into<String>) -> Self {
        Self {
            max_steps,
            cancel: CancellationToken::new(),
            deadline: None,
            correlation_id: correlation_id.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineOutcome {
    pub final_answer: String,
    pub trace: Trace,
    pub status: EngineStatus,
    pub steps: u32,
}

enum Invocation {
    Advance { message: Message, signal: StepSignal, flag: Option<TraceFlag> },
    Abort { raw: String },
}

enum Interrupted {
    Cancelled,
    DeadlineExceeded,
}

pub struct OrchestrationEngine {
    router: Arc<dyn RouterActor>,
    worker: Arc<dyn WorkerActor>,
    tools: Arc<ToolExecutor>,
    schema_context: String,
    flow: FlowEngine<AnalysisFlow>,
    fallback: RouterFallbackPolicy,
    audit: Arc<dyn AuditSink>,
}

impl OrchestrationEngine {
    pub fn new(
        router: Arc<dyn RouterActor>,
        worker: Arc<dyn WorkerActor>,
        tools: Arc<ToolExecutor>,
        schema_context: impl Into<String>,
    ) -> Self {
        Self {
            router,
            worker,
            tools,
            schema_context: schema_context.into(),
            flow: FlowEngine::default(),
            fallback: RouterFallbackPolicy::default(),
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_fallback(mut self, fallback: RouterFallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub async fn run(&self, query: &str, options: RunOptions) -> EngineOutcome {
        let correlation_id = options.correlation_id.as_str();
        let audit_context = AuditContext::new(correlation_id, ENGINE_ACTOR);
        let mut conversation = Conversation::new(query);
        let mut trace = Trace::default();
        let mut current = self.flow.initial_actor();
        let mut step: u32 = 0;

        let status = loop {
            if step >= options.max_steps {
                trace.flag_last(TraceFlag::StepLimit);
                warn!(
                    event_name = "agent.engine.step_limit_reached",
                    correlation_id,
                    max_steps = options.max_steps,
                    "step budget exhausted before the router finished"
                );
                self.emit(
                    &audit_context,
                    "engine.step_limit_reached",
                    AuditCategory::Flow,
                    AuditOutcome::Degraded,
                    vec![("max_steps", options.max_steps.to_string())],
                );
                break EngineStatus::StepLimitReached;
            }

            if let Some(reason) = self.interrupted(&options) {
                break self.cancelled(&audit_context, reason, step);
            }

            debug!(
                event_name = "agent.engine.invoke",
                correlation_id,
                actor = current.trace_name(),
                step,
                "invoking actor"
            );

            // A started invocation always runs to completion. Stops are honoured
            // at the top of the next iteration.
            let invocation = self.invoke(current, &conversation, step, &options, &audit_context).await;

            let invocation = match invocation {
                Ok(invocation) => invocation,
                Err(failure) => {
                    trace.record_flagged(
                        step,
                        current,
                        format!("error: {failure}"),
                        TraceFlag::Error,
                    );
                    step += 1;
                    error!(
                        event_name = "agent.engine.collaborator_failed",
                        correlation_id,
                        actor = current.trace_name(),
                        error_class = failure.error_class(),
                        error = %failure,
                        "actor invocation failed"
                    );
                    self.emit(
                        &audit_context,
                        "engine.collaborator_failed",
                        AuditCategory::Flow,
                        AuditOutcome::Failed,
                        vec![
                            ("actor", current.trace_name().to_string()),
                            ("error_class", failure.error_class().to_string()),
                        ],
                    );
                    break EngineStatus::CollaboratorFailure;
                }
            };

            match invocation {
                Invocation::Abort { raw } => {
                    trace.record_flagged(
                        step,
                        current,
                        format!("protocol violation: {raw}"),
                        TraceFlag::ProtocolViolation,
                    );
                    step += 1;
                    break EngineStatus::RouterProtocolViolation;
                }
                Invocation::Advance { message, signal, flag } => {
                    let content = message.trace_content().to_string();
                    match flag {
                        Some(flag) => trace.record_flagged(step, current, content, flag),
                        None => trace.record(step, current, content),
                    }
                    conversation.append(current, [message]);
                    step += 1;

                    let transition = self.flow.apply_with_audit(
                        current,
                        signal,
                        self.audit.as_ref(),
                        &audit_context,
                    );
                    match transition {
                        Ok(outcome) => match outcome.to {
                            NextHop::Terminal => break EngineStatus::Completed,
                            NextHop::Actor(next) => current = next,
                        },
                        Err(rejected) => {
                            error!(
                                event_name = "agent.engine.transition_rejected",
                                correlation_id,
                                error = %rejected,
                                "actor produced a signal outside the transition table"
                            );
                            trace.flag_last(TraceFlag::Error);
                            break EngineStatus::CollaboratorFailure;
                        }
                    }
                }
            }
        };

        let final_answer = match status {
            EngineStatus::CollaboratorFailure => FAILURE_ANSWER.to_string(),
            _ => conversation.latest_answer().unwrap_or(FALLBACK_ANSWER).to_string(),
        };

        info!(
            event_name = "agent.engine.finished",
            correlation_id,
            status = status.as_str(),
            steps = step,
            trace_len = trace.len(),
            "orchestration finished"
        );

        EngineOutcome { final_answer, trace, status, steps: step }
    }

    async fn invoke(
        &self,
        actor: ActorKind,
        conversation: &Conversation,
        step: u32,
        options: &RunOptions,
        audit_context: &AuditContext,
    ) -> Result<Invocation, ActorError> {
        match actor {
            ActorKind::Router => {
                let verdict = self.router.decide(conversation.messages()).await?;
                Ok(self.resolve_verdict(verdict, step, options, audit_context))
            }
            ActorKind::Worker => {
                let mut message =
                    self.worker.act(conversation.messages(), &self.schema_context).await?;
                message.origin = Origin::Worker;
                message.tool_call_id = None;

                if message.tool_request.is_some() {
                    if !message.content.trim().is_empty() {
                        warn!(
                            event_name = "agent.engine.worker_mixed_output",
                            correlation_id = %options.correlation_id,
                            "worker message had content and a tool request; content dropped"
                        );
                        message.content.clear();
                    }
                    return Ok(Invocation::Advance {
                        message,
                        signal: StepSignal::ToolRequested,
                        flag: None,
                    });
                }

                let flag = message.content.trim().is_empty().then_some(TraceFlag::LowConfidence);
                Ok(Invocation::Advance { message, signal: StepSignal::Answered, flag })
            }
            ActorKind::ToolExecutor => {
                let request = conversation
                    .messages()
                    .last()
                    .and_then(|message| message.tool_request.clone());
                let message = match request {
                    Some(request) => {
                        let output = self.tools.execute(&request).await;
                        Message::tool_result(request.call_id, output)
                    }
                    None => Message::tool_result(
                        String::new(),
                        "Error executing code: no tool request to execute",
                    ),
                };
                Ok(Invocation::Advance { message, signal: StepSignal::ToolCompleted, flag: None })
            }
        }
    }

    fn resolve_verdict(
        &self,
        verdict: RouterVerdict,
        step: u32,
        options: &RunOptions,
        audit_context: &AuditContext,
    ) -> Invocation {
        let raw = match verdict {
            RouterVerdict::Decision(decision) => {
                return Invocation::Advance {
                    message: Message::router(decision),
                    signal: decision.signal(),
                    flag: None,
                };
            }
            RouterVerdict::Violation { raw } => raw,
        };

        // A Worker path exists only if the Worker can still run within the budget.
        let worker_path_available = step + 1 < options.max_steps;
        let resolved = self.fallback.resolve(worker_path_available);
        let resolved_label = resolved.map(|decision| decision.label()).unwrap_or("abort");

        warn!(
            event_name = "agent.router.protocol_violation",
            correlation_id = %options.correlation_id,
            raw = %raw,
            policy = self.fallback.as_str(),
            resolved = resolved_label,
            "router answered outside the decision set"
        );
        self.emit(
            audit_context,
            "router.protocol_violation",
            AuditCategory::Routing,
            AuditOutcome::Degraded,
            vec![
                ("raw", raw.clone()),
                ("policy", self.fallback.as_str().to_string()),
                ("resolved", resolved_label.to_string()),
            ],
        );

        match resolved {
            Some(decision) => Invocation::Advance {
                message: Message::router(decision),
                signal: decision.signal(),
                flag: Some(TraceFlag::ProtocolViolation),
            },
            None => Invocation::Abort { raw },
        }
    }

    fn interrupted(&self, options: &RunOptions) -> Option<Interrupted> {
        if options.cancel.is_cancelled() {
            return Some(Interrupted::Cancelled);
        }
        match options.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interrupted::DeadlineExceeded),
            _ => None,
        }
    }

    fn cancelled(&self, audit_context: &AuditContext, reason: Interrupted, step: u32) -> EngineStatus {
        let reason = match reason {
            Interrupted::Cancelled => "cancelled",
            Interrupted::DeadlineExceeded => "deadline_exceeded",
        };
        warn!(
            event_name = "agent.engine.cancelled",
            correlation_id = %audit_context.correlation_id,
            reason,
            step,
            "request stopped before completion"
        );
        self.emit(
            audit_context,
            "engine.cancelled",
            AuditCategory::Flow,
            AuditOutcome::Degraded,
            vec![("reason", reason.to_string()), ("step", step.to_string())],
        );
        EngineStatus::Cancelled
    }

    fn emit(
        &self,
        audit_context: &AuditContext,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
        metadata: Vec<(&str, String)>,
    ) {
        let event = metadata.into_iter().fold(
            AuditEvent::new(
                audit_context.correlation_id.clone(),
                event_type,
                category,
                audit_context.actor.clone(),
                outcome,
            ),
            |event, (key, value)| event.with_metadata(key, value),
        );
        self.audit.emit(event);
    }
}
