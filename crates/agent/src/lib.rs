//! Agent runtime for natural-language health data analysis.
//!
//! A query passes the scope filter, is redacted, and then runs through a
//! bounded loop of three actors:
//! 1. **Router** (`router`) decides whether the Worker should act or the run is done
//! 2. **Worker** (`worker`) answers or asks for an analysis script to be run
//! 3. **Tool-Executor** (`tools`) runs the script over the loaded datasets
//!
//! The engine (`engine`) owns the loop, the step budget and the trace. The
//! model is reached through the `LlmClient` trait so every actor can be
//! replaced by a scripted fake in tests.

pub mod actor;
pub mod builder;
pub mod conversation;
pub mod engine;
pub mod guardrails;
pub mod llm;
pub mod prompts;
pub mod provider;
pub mod redaction;
pub mod router;
pub mod runtime;
pub mod tools;
pub mod worker;

pub use builder::{build_runtime, build_runtime_with_llm, BuildError};
pub use engine::{EngineOutcome, EngineStatus, OrchestrationEngine, RunOptions, FALLBACK_ANSWER};
pub use runtime::{AgentRuntime, AnalysisResponse, RequestOptions, ResponseStatus};
