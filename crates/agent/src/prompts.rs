use serde_json::{json, Value};

use crate::conversation::{Message, Origin};
use crate::llm::{PromptMessage, ToolCall};

pub const ROUTER_OUTPUT_NAME: &str = "route";
pub const WORKER_LABEL: &str = "Data_Analyst";
pub const FINISH_LABEL: &str = "FINISH";

pub const DISCLAIMER: &str = "Disclaimer: The following analysis is based on a hypothetical dataset and does not constitute medical advice. Consult a qualified healthcare professional for any health concerns.";

const ROUTER_SYSTEM_PROMPT: &str = "\
You are a meticulous supervisor directing an analysis workflow. Your only task is to \
read the conversation and decide the next actor.

Decision rules:
1. Data_Analyst: the user's query needs data analysis, a calculation, code execution, \
or a statistic from the datasets, and the latest analyst message does not yet answer it. \
This is the default for a new query.
2. FINISH: the latest analyst message is a complete, sufficient answer to the user's question.

Never answer the question yourself. Reply with a JSON object of the form \
{\"next_actor\": \"Data_Analyst\"} or {\"next_actor\": \"FINISH\"} and nothing else.";

const WORKER_SYSTEM_PROMPT: &str = "\
You are a senior health data scientist. You answer questions by running scripts with the \
`analysis` tool over two in-memory tables, `health` and `activity`.

SCHEMA DESCRIPTION:
{schema}

ANALYSIS SCRIPT LANGUAGE
A script is one statement per line (or separated by `;`). `#` starts a comment.
  let NAME = PIPELINE     bind an intermediate table, prints nothing
  PIPELINE                print the result (a single value prints as a bare number)
A PIPELINE starts from `health`, `activity` or a let-bound name followed by `| stage` steps:
  where EXPR                               keep rows where EXPR is true
  select COL, COL                          keep columns
  derive NAME = EXPR, ...                  add computed columns
  join TABLE on Patient_Number             inner join with another table
  summarize AGG(COL) as NAME, ... by COL   aggregate, optionally per group
  sort COL desc | sort COL asc
  limit N
  count                                    number of rows
Aggregates: count(), count(COL), sum, mean, min, max, median, std, corr(COL, COL).
Expressions: numbers, column names, + - * /, == != < <= > >=, and, or, not, parentheses.
Example:
  let steps = activity | summarize mean(Physical_activity) as avg_steps by Patient_Number
  health | where Chronic_kidney_disease == 1 | join steps on Patient_Number | summarize mean(avg_steps)

INSTRUCTIONS
1. To run a script, call the `analysis` tool with {\"code\": \"<script>\"}.
2. `activity` has ten rows per patient. Aggregate it by Patient_Number before joining with `health`.
3. If a script returns an error, fix the script and call the tool again.
4. Once you have the numbers, answer in plain language and include the figures.

ETHICAL AND CLINICAL GUARDRAILS
1. Never give personalized medical diagnoses, treatment plans or emergency advice.
2. Begin every final answer with: {disclaimer}
3. Limit the analysis to the provided data columns.
4. If asked for personal medical advice or anything harmful, refuse politely and state your role as a data analyst.";

pub fn router_system_prompt() -> &'static str {
    ROUTER_SYSTEM_PROMPT
}

pub fn router_output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "next_actor": { "type": "string", "enum": [WORKER_LABEL, FINISH_LABEL] }
        },
        "required": ["next_actor"],
        "additionalProperties": false
    })
}

pub fn worker_system_prompt(schema_context: &str) -> String {
    WORKER_SYSTEM_PROMPT.replace("{schema}", schema_context.trim_end()).replace("{disclaimer}", DISCLAIMER)
}

/// Flattens the history into one transcript for the Router.
///
/// Router control messages are left out so the decision depends only on the
/// user query and the work done so far.
pub fn router_transcript(messages: &[Message]) -> Vec<PromptMessage> {
    let lines: Vec<String> = messages
        .iter()
        .filter(|message| message.origin != Origin::Router)
        .map(|message| match message.origin {
            Origin::User => format!("User: {}", message.content),
            Origin::Worker if message.tool_request.is_some() => {
                format!("{WORKER_LABEL}: [called the analysis tool]")
            }
            Origin::Worker => format!("{WORKER_LABEL}: {}", message.content),
            Origin::Tool => format!("tools: {}", message.content),
            Origin::Router => String::new(),
        })
        .collect();

    vec![
        PromptMessage::user(format!("Conversation so far:\n{}", lines.join("\n"))),
        PromptMessage::user(format!("Next step must be one of: [{WORKER_LABEL}, {FINISH_LABEL}].")),
    ]
}

/// Chat history for the Worker, with tool calls and their outputs paired by call id.
pub fn worker_messages(messages: &[Message]) -> Vec<PromptMessage> {
    messages
        .iter()
        .filter_map(|message| match message.origin {
            Origin::Router => None,
            Origin::User => Some(PromptMessage::user(message.content.clone())),
            Origin::Worker => Some(match &message.tool_request {
                Some(request) => PromptMessage::assistant_tool_call(ToolCall {
                    id: request.call_id.clone(),
                    name: request.tool.clone(),
                    arguments: request.arguments.clone(),
                }),
                None => PromptMessage::assistant(message.content.clone()),
            }),
            Origin::Tool => Some(PromptMessage::tool(
                message.tool_call_id.clone().unwrap_or_default(),
                message.content.clone(),
            )),
        })
        .collect()
}
