use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;
use vitalis_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};

use crate::engine::{EngineOutcome, EngineStatus, OrchestrationEngine, RunOptions};
use crate::guardrails::{ScopeFilter, ScopeVerdict};
use crate::redaction::Redactor;

const RUNTIME_ACTOR: &str = "agent-runtime";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Completed,
    StepLimitReached,
    Cancelled,
    CollaboratorFailure,
    RouterProtocolViolation,
    Rejected,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rejected => "rejected",
            Self::Completed => EngineStatus::Completed.as_str(),
            Self::StepLimitReached => EngineStatus::StepLimitReached.as_str(),
            Self::Cancelled => EngineStatus::Cancelled.as_str(),
            Self::CollaboratorFailure => EngineStatus::CollaboratorFailure.as_str(),
            Self::RouterProtocolViolation => EngineStatus::RouterProtocolViolation.as_str(),
        }
    }
}

impl From<EngineStatus> for ResponseStatus {
    fn from(status: EngineStatus) -> Self {
        match status {
            EngineStatus::Completed => Self::Completed,
            EngineStatus::StepLimitReached => Self::StepLimitReached,
            EngineStatus::Cancelled => Self::Cancelled,
            EngineStatus::CollaboratorFailure => Self::CollaboratorFailure,
            EngineStatus::RouterProtocolViolation => Self::RouterProtocolViolation,
        }
    }
}

/// What a caller gets back for one query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub final_answer: String,
    pub trace: Vec<String>,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    pub correlation_id: String,
    pub steps: u32,
}

/// Per-request knobs; unset fields fall back to the runtime's configuration.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub max_steps: Option<u32>,
    pub cancel: Option<CancellationToken>,
    pub correlation_id: Option<String>,
}

pub struct AgentRuntime {
    filter: Arc<dyn ScopeFilter>,
    redactor: Arc<dyn Redactor>,
    engine: OrchestrationEngine,
    audit: Arc<dyn AuditSink>,
    max_steps: u32,
    request_timeout: Duration,
}

impl AgentRuntime {
    pub fn new(
        filter: Arc<dyn ScopeFilter>,
        redactor: Arc<dyn Redactor>,
        engine: OrchestrationEngine,
        audit: Arc<dyn AuditSink>,
        max_steps: u32,
        request_timeout: Duration,
    ) -> Self {
        Self { filter, redactor, engine, audit, max_steps, request_timeout }
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    pub async fn handle_query(&self, query: &str) -> AnalysisResponse {
        self.handle_query_with(query, RequestOptions::default()).await
    }

    pub async fn handle_query_with(&self, query: &str, options: RequestOptions) -> AnalysisResponse {
        let correlation_id =
            options.correlation_id.unwrap_or_else(|| format!("req_{}", Uuid::new_v4().simple()));
        info!(
            event_name = "agent.request.received",
            correlation_id = %correlation_id,
            query_chars = query.chars().count(),
            "analysis request received"
        );

        if let ScopeVerdict::Reject(reason) = self.filter.check(query) {
            warn!(
                event_name = "agent.guardrail.rejected",
                correlation_id = %correlation_id,
                reason_code = reason.reason_code(),
                "query rejected before orchestration"
            );
            self.audit.emit(
                AuditEvent::new(
                    correlation_id.clone(),
                    "guardrail.rejected",
                    AuditCategory::Guardrail,
                    RUNTIME_ACTOR,
                    AuditOutcome::Rejected,
                )
                .with_metadata("reason_code", reason.reason_code()),
            );
            return AnalysisResponse {
                final_answer: reason.refusal_message().to_string(),
                trace: Vec::new(),
                status: ResponseStatus::Rejected,
                reason_code: Some(reason.reason_code().to_string()),
                correlation_id,
                steps: 0,
            };
        }

        let redacted = self.redactor.redact(query);
        let run = RunOptions {
            max_steps: options.max_steps.unwrap_or(self.max_steps),
            cancel: options.cancel.unwrap_or_default(),
            deadline: Instant::now().checked_add(self.request_timeout),
            correlation_id: correlation_id.clone(),
        };
        let EngineOutcome { final_answer, trace, status, steps } =
            self.engine.run(&redacted, run).await;

        info!(
            event_name = "agent.request.completed",
            correlation_id = %correlation_id,
            status = status.as_str(),
            steps,
            "analysis request completed"
        );

        AnalysisResponse {
            final_answer,
            trace: trace.render(),
            status: status.into(),
            reason_code: None,
            correlation_id,
            steps,
        }
    }
}
