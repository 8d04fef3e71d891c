use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use vitalis_core::audit::{AuditSink, TracingAuditSink};
use vitalis_core::config::{AppConfig, ConfigError};
use vitalis_core::dataset::Datasets;

use crate::engine::OrchestrationEngine;
use crate::guardrails::KeywordScopeFilter;
use crate::llm::{LlmClient, LlmError};
use crate::provider::OpenAiCompatibleClient;
use crate::redaction::PatternRedactor;
use crate::router::LlmRouter;
use crate::runtime::AgentRuntime;
use crate::tools::{AnalysisTool, ToolExecutor, ToolRegistry};
use crate::worker::LlmWorker;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("llm client setup failed: {0}")]
    Llm(#[from] LlmError),
    #[error("invalid filter pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Wires the configured provider into a ready runtime.
pub fn build_runtime(config: &AppConfig, datasets: Arc<Datasets>) -> Result<AgentRuntime, BuildError> {
    config.llm.ensure_credentials()?;
    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiCompatibleClient::from_config(&config.llm)?);
    build_runtime_with_llm(config, datasets, llm, Arc::new(TracingAuditSink))
}

/// Same wiring with a caller-supplied model client and audit sink.
pub fn build_runtime_with_llm(
    config: &AppConfig,
    datasets: Arc<Datasets>,
    llm: Arc<dyn LlmClient>,
    audit: Arc<dyn AuditSink>,
) -> Result<AgentRuntime, BuildError> {
    let schema_context = datasets.schema_context();

    let mut registry = ToolRegistry::default();
    registry.register(AnalysisTool::new(datasets));
    let tools = Arc::new(ToolExecutor::new(registry, config.agent.max_tool_output_chars));

    let router = Arc::new(LlmRouter::new(Arc::clone(&llm), config.agent.router_parse_attempts));
    let worker = Arc::new(LlmWorker::new(llm, tools.specs()));

    let engine = OrchestrationEngine::new(router, worker, tools, schema_context)
        .with_fallback(config.agent.router_fallback)
        .with_audit_sink(Arc::clone(&audit));

    Ok(AgentRuntime::new(
        Arc::new(KeywordScopeFilter::new()?),
        Arc::new(PatternRedactor::new()?),
        engine,
        audit,
        config.agent.max_steps,
        Duration::from_secs(config.agent.request_timeout_secs),
    ))
}
