use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};
use vitalis_core::analysis::run_script;
use vitalis_core::dataset::Datasets;

use crate::conversation::ToolRequest;
use crate::llm::ToolSpec;

pub const ANALYSIS_TOOL: &str = "analysis";
pub const EMPTY_OUTPUT_HINT: &str =
    "(no output: the script printed nothing. End it with a pipeline that is not a let binding.)";
const LOG_SNIPPET_CHARS: usize = 100;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn spec(&self) -> ToolSpec;
    async fn execute(&self, input: Value) -> Result<Value>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub async fn execute(&self, name: &str, input: Value) -> Result<Value> {
        let tool = self.tools.get(name).ok_or_else(|| anyhow!("unknown tool `{name}`"))?;
        tool.execute(input).await
    }

    /// Specs sorted by tool name so prompts are stable.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|tool| tool.spec()).collect();
        specs.sort_by(|left, right| left.name.cmp(&right.name));
        specs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Runs analysis scripts over the shared, read-only datasets.
pub struct AnalysisTool {
    datasets: Arc<Datasets>,
}

impl AnalysisTool {
    pub fn new(datasets: Arc<Datasets>) -> Self {
        Self { datasets }
    }
}

#[async_trait]
impl Tool for AnalysisTool {
    fn name(&self) -> &'static str {
        ANALYSIS_TOOL
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: ANALYSIS_TOOL.to_string(),
            description: "Runs an analysis script over the `health` and `activity` tables and \
                          returns what it prints."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "code": { "type": "string", "description": "The analysis script to run." }
                },
                "required": ["code"]
            }),
        }
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let Some(code) = input.get("code").and_then(Value::as_str) else {
            bail!("missing string argument `code`");
        };
        let code = code.to_string();
        let datasets = Arc::clone(&self.datasets);

        let output = tokio::task::spawn_blocking(move || run_script(&code, &datasets))
            .await
            .context("analysis task did not complete")??;
        Ok(Value::String(output))
    }
}

/// The Tool-Executor actor: every failure comes back as text for the Worker.
pub struct ToolExecutor {
    registry: ToolRegistry,
    max_output_chars: usize,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, max_output_chars: usize) -> Self {
        Self { registry, max_output_chars }
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    pub async fn execute(&self, request: &ToolRequest) -> String {
        let input = match serde_json::from_str::<Value>(&request.arguments) {
            Ok(input) => input,
            Err(error) => {
                warn!(
                    event_name = "agent.tool.malformed_arguments",
                    tool = %request.tool,
                    call_id = %request.call_id,
                    "tool arguments are not valid json"
                );
                return format!("Error executing code: tool arguments are not valid JSON ({error})");
            }
        };
        self.run(&request.tool, input).await
    }

    pub async fn execute_code(&self, code: &str) -> String {
        self.run(ANALYSIS_TOOL, json!({ "code": code })).await
    }

    async fn run(&self, tool: &str, input: Value) -> String {
        let snippet: String = input
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .replace('\n', " ")
            .chars()
            .take(LOG_SNIPPET_CHARS)
            .collect();

        match self.registry.execute(tool, input).await {
            Ok(value) => {
                let output = match value {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                info!(
                    event_name = "agent.tool.executed",
                    tool,
                    code = %snippet,
                    output_chars = output.len(),
                    "tool execution succeeded"
                );
                if output.trim().is_empty() {
                    EMPTY_OUTPUT_HINT.to_string()
                } else {
                    truncate(output, self.max_output_chars)
                }
            }
            Err(error) => {
                warn!(
                    event_name = "agent.tool.failed",
                    tool,
                    code = %snippet,
                    error = %error,
                    "tool execution failed"
                );
                format!("Error executing code: {error}")
            }
        }
    }
}

fn truncate(output: String, max_chars: usize) -> String {
    let total = output.chars().count();
    if total <= max_chars {
        return output;
    }
    let mut kept: String = output.chars().take(max_chars).collect();
    kept.push_str(&format!("\n... (output truncated, {} more characters)", total - max_chars));
    kept
}
