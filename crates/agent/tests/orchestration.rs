use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::{Duration, Instant};
use vitalis_agent::actor::{ActorError, RouterActor, RouterVerdict, WorkerActor};
use vitalis_agent::conversation::{Message, ToolRequest};
use vitalis_agent::engine::FAILURE_ANSWER;
use vitalis_agent::llm::{Completion, CompletionRequest, LlmClient, LlmError, OutputMode, ToolCall};
use vitalis_agent::router::LlmRouter;
use vitalis_agent::tools::{AnalysisTool, ToolExecutor, ToolRegistry};
use vitalis_agent::{
    build_runtime_with_llm, EngineStatus, OrchestrationEngine, ResponseStatus, RunOptions,
    FALLBACK_ANSWER,
};
use vitalis_core::audit::InMemoryAuditSink;
use vitalis_core::config::AppConfig;
use vitalis_core::dataset::{Datasets, Table};
use vitalis_core::flows::{RouterFallbackPolicy, RoutingDecision};

const SMOKERS_WITH_CKD: &str = "health | where Smoking == 1 and Chronic_kidney_disease == 1 | count";

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

fn fixture() -> Arc<Datasets> {
    let health = Table::new(
        "health",
        columns(&["Patient_Number", "Age", "Smoking", "Chronic_kidney_disease", "BMI"]),
        vec![
            vec![1.0, 64.0, 1.0, 1.0, 31.2],
            vec![2.0, 41.0, 1.0, 0.0, 24.0],
            vec![3.0, 58.0, 0.0, 1.0, 22.1],
            vec![4.0, 70.0, 1.0, 1.0, 27.5],
        ],
    );
    let activity = Table::new(
        "activity",
        columns(&["Patient_Number", "Day_Number", "Physical_activity"]),
        vec![vec![1.0, 1.0, 3000.0], vec![2.0, 1.0, 8000.0]],
    );
    Arc::new(Datasets::new(health, activity).expect("fixture datasets"))
}

fn tool_call(code: &str) -> Message {
    Message::worker_tool_call(ToolRequest {
        call_id: "call-1".to_string(),
        tool: "analysis".to_string(),
        arguments: serde_json::json!({ "code": code }).to_string(),
    })
}

struct ScriptedRouter {
    verdicts: Mutex<VecDeque<Result<RouterVerdict, ActorError>>>,
}

impl ScriptedRouter {
    fn new(verdicts: impl IntoIterator<Item = Result<RouterVerdict, ActorError>>) -> Arc<Self> {
        Arc::new(Self { verdicts: Mutex::new(verdicts.into_iter().collect()) })
    }
}

#[async_trait]
impl RouterActor for ScriptedRouter {
    async fn decide(&self, _messages: &[Message]) -> Result<RouterVerdict, ActorError> {
        self.verdicts
            .lock()
            .expect("router lock")
            .pop_front()
            .unwrap_or(Ok(RouterVerdict::Decision(RoutingDecision::Finish)))
    }
}

/// Replays scripted messages, then keeps asking for the same tool forever.
struct ScriptedWorker {
    replies: Mutex<VecDeque<Result<Message, ActorError>>>,
    calls: AtomicUsize,
}

impl ScriptedWorker {
    fn new(replies: impl IntoIterator<Item = Result<Message, ActorError>>) -> Arc<Self> {
        Arc::new(Self { replies: Mutex::new(replies.into_iter().collect()), calls: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl WorkerActor for ScriptedWorker {
    async fn act(&self, _messages: &[Message], _schema_context: &str) -> Result<Message, ActorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .expect("worker lock")
            .pop_front()
            .unwrap_or_else(|| Ok(tool_call("health | count")))
    }
}

fn engine(router: Arc<ScriptedRouter>, worker: Arc<ScriptedWorker>) -> OrchestrationEngine {
    let mut registry = ToolRegistry::default();
    registry.register(AnalysisTool::new(fixture()));
    let tools = Arc::new(ToolExecutor::new(registry, 4000));
    OrchestrationEngine::new(router, worker, tools, "TABLE 1: health")
}

#[tokio::test]
async fn smoker_question_runs_router_worker_tool_worker_router() {
    let router = ScriptedRouter::new([
        Ok(RouterVerdict::Decision(RoutingDecision::Continue)),
        Ok(RouterVerdict::Decision(RoutingDecision::Finish)),
    ]);
    let worker = ScriptedWorker::new([
        Ok(tool_call(SMOKERS_WITH_CKD)),
        Ok(Message::worker_answer("2 smokers have chronic kidney disease.")),
    ]);

    let outcome = engine(router, worker)
        .run("How many smokers have chronic kidney disease?", RunOptions::new(25, "req-1"))
        .await;

    assert_eq!(outcome.status, EngineStatus::Completed);
    assert_eq!(outcome.final_answer, "2 smokers have chronic kidney disease.");
    assert_eq!(outcome.steps, 5);
    assert_eq!(
        outcome.trace.render(),
        vec![
            "Router: Routing to: Worker",
            "Worker: [Tool Call]",
            "Tool: 2",
            "Worker: 2 smokers have chronic kidney disease.",
            "Router: Routing to: FINISH",
        ]
    );
    let steps: Vec<u32> = outcome.trace.entries().iter().map(|entry| entry.step).collect();
    assert_eq!(steps, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn worker_that_never_answers_hits_the_step_limit() {
    let router = ScriptedRouter::new([Ok(RouterVerdict::Decision(RoutingDecision::Continue))]);
    let worker = ScriptedWorker::new([]);

    let outcome = engine(router, Arc::clone(&worker))
        .run("Keep analysing", RunOptions::new(25, "req-2"))
        .await;

    assert_eq!(outcome.status, EngineStatus::StepLimitReached);
    assert_eq!(outcome.final_answer, FALLBACK_ANSWER);
    assert_eq!(outcome.trace.len(), 25);
    assert_eq!(outcome.steps, 25);
    assert_eq!(worker.calls.load(Ordering::SeqCst), 12);
    let last = outcome.trace.render().pop().expect("last entry");
    assert!(last.ends_with("[step-limit]"), "{last}");
}

#[tokio::test]
async fn script_errors_flow_back_to_the_worker() {
    let router = ScriptedRouter::new([
        Ok(RouterVerdict::Decision(RoutingDecision::Continue)),
        Ok(RouterVerdict::Decision(RoutingDecision::Finish)),
    ]);
    let worker = ScriptedWorker::new([
        Ok(tool_call("health | where Weight > 3 | count")),
        Ok(tool_call(SMOKERS_WITH_CKD)),
        Ok(Message::worker_answer("There are 2.")),
    ]);

    let outcome = engine(router, worker).run("How many?", RunOptions::new(25, "req-3")).await;

    assert_eq!(outcome.status, EngineStatus::Completed);
    let rendered = outcome.trace.render();
    assert!(rendered[2].starts_with("Tool: Error executing code:"), "{}", rendered[2]);
    assert_eq!(rendered[4], "Tool: 2");
    assert_eq!(outcome.final_answer, "There are 2.");
}

#[tokio::test]
async fn adaptive_fallback_continues_after_a_protocol_violation() {
    let router = ScriptedRouter::new([
        Ok(RouterVerdict::Violation { raw: "Analyst please".to_string() }),
        Ok(RouterVerdict::Decision(RoutingDecision::Finish)),
    ]);
    let worker = ScriptedWorker::new([Ok(Message::worker_answer("Done."))]);
    let audit = Arc::new(InMemoryAuditSink::default());

    let outcome = engine(router, worker)
        .with_audit_sink(audit.clone())
        .run("Average BMI?", RunOptions::new(25, "req-4"))
        .await;

    assert_eq!(outcome.status, EngineStatus::Completed);
    assert_eq!(outcome.trace.render()[0], "Router: Routing to: Worker [protocol-violation]");
    assert_eq!(audit.events_of_type("router.protocol_violation").len(), 1);
    assert_eq!(audit.events_of_type("flow.transition_applied").len(), 3);
}

#[tokio::test]
async fn abort_fallback_stops_the_request() {
    let router =
        ScriptedRouter::new([Ok(RouterVerdict::Violation { raw: "maybe".to_string() })]);
    let worker = ScriptedWorker::new([]);

    let outcome = engine(router, Arc::clone(&worker))
        .with_fallback(RouterFallbackPolicy::Abort)
        .run("Average BMI?", RunOptions::new(25, "req-5"))
        .await;

    assert_eq!(outcome.status, EngineStatus::RouterProtocolViolation);
    assert_eq!(outcome.final_answer, FALLBACK_ANSWER);
    assert_eq!(outcome.trace.render(), vec!["Router: protocol violation: maybe [protocol-violation]"]);
    assert_eq!(worker.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancelled_requests_stop_before_the_next_invocation() {
    let options = RunOptions::new(25, "req-6");
    options.cancel.cancel();

    let outcome = engine(ScriptedRouter::new([]), ScriptedWorker::new([]))
        .run("Average BMI?", options)
        .await;

    assert_eq!(outcome.status, EngineStatus::Cancelled);
    assert!(outcome.trace.is_empty());
    assert_eq!(outcome.final_answer, FALLBACK_ANSWER);
}

#[tokio::test]
async fn expired_deadline_counts_as_cancellation() {
    let mut options = RunOptions::new(25, "req-7");
    options.deadline = Some(Instant::now() - Duration::from_millis(1));

    let outcome = engine(ScriptedRouter::new([]), ScriptedWorker::new([]))
        .run("Average BMI?", options)
        .await;

    assert_eq!(outcome.status, EngineStatus::Cancelled);
    assert_eq!(outcome.steps, 0);
}

/// Takes its time before asking the Worker to continue.
struct SlowRouter {
    delay: Duration,
    calls: AtomicUsize,
}

#[async_trait]
impl RouterActor for SlowRouter {
    async fn decide(&self, _messages: &[Message]) -> Result<RouterVerdict, ActorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(RouterVerdict::Decision(RoutingDecision::Continue))
    }
}

#[tokio::test]
async fn cancellation_waits_for_the_running_invocation() {
    let router = Arc::new(SlowRouter { delay: Duration::from_millis(300), calls: AtomicUsize::new(0) });
    let worker = ScriptedWorker::new([]);
    let mut registry = ToolRegistry::default();
    registry.register(AnalysisTool::new(fixture()));
    let engine = OrchestrationEngine::new(
        router.clone(),
        worker.clone(),
        Arc::new(ToolExecutor::new(registry, 4000)),
        "TABLE 1: health",
    );

    let options = RunOptions::new(25, "req-7b");
    let cancel = options.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let outcome = engine.run("Average BMI?", options).await;

    assert_eq!(outcome.status, EngineStatus::Cancelled);
    assert_eq!(router.calls.load(Ordering::SeqCst), 1);
    assert_eq!(worker.calls.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.trace.len(), 1);
    assert_eq!(outcome.steps, 1);
    assert_eq!(outcome.trace.render(), vec!["Router: Routing to: Worker"]);
}

/// Always asks for more work.
struct RestlessRouter;

#[async_trait]
impl RouterActor for RestlessRouter {
    async fn decide(&self, _messages: &[Message]) -> Result<RouterVerdict, ActorError> {
        Ok(RouterVerdict::Decision(RoutingDecision::Continue))
    }
}

/// Answers every turn with a numbered reply.
struct ChattyWorker {
    calls: AtomicUsize,
}

#[async_trait]
impl WorkerActor for ChattyWorker {
    async fn act(&self, _messages: &[Message], _schema_context: &str) -> Result<Message, ActorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Message::worker_answer(format!("Answer {call}")))
    }
}

#[tokio::test]
async fn router_that_never_finishes_is_bounded_by_the_step_limit() {
    let worker = Arc::new(ChattyWorker { calls: AtomicUsize::new(0) });
    let mut registry = ToolRegistry::default();
    registry.register(AnalysisTool::new(fixture()));
    let engine = OrchestrationEngine::new(
        Arc::new(RestlessRouter),
        worker.clone(),
        Arc::new(ToolExecutor::new(registry, 4000)),
        "TABLE 1: health",
    );

    let outcome = engine.run("Tell me everything", RunOptions::new(25, "req-7c")).await;

    assert_eq!(outcome.status, EngineStatus::StepLimitReached);
    assert_eq!(outcome.trace.len(), 25);
    assert_eq!(outcome.steps, 25);
    assert_eq!(worker.calls.load(Ordering::SeqCst), 12);
    assert_eq!(outcome.final_answer, "Answer 12");
    let last = outcome.trace.render().pop().expect("last entry");
    assert_eq!(last, "Router: Routing to: Worker [step-limit]");
}

#[tokio::test]
async fn failing_worker_is_reported_as_collaborator_failure() {
    let router = ScriptedRouter::new([Ok(RouterVerdict::Decision(RoutingDecision::Continue))]);
    let worker = ScriptedWorker::new([Err(ActorError::Llm(LlmError::Timeout(
        "no response in 60s".to_string(),
    )))]);

    let outcome = engine(router, worker).run("Average BMI?", RunOptions::new(25, "req-8")).await;

    assert_eq!(outcome.status, EngineStatus::CollaboratorFailure);
    assert_eq!(outcome.final_answer, FAILURE_ANSWER);
    let last = outcome.trace.render().pop().expect("last entry");
    assert!(last.starts_with("Worker: error: language model call timed out"), "{last}");
    assert!(last.ends_with("[error]"));
}

#[tokio::test]
async fn empty_worker_answer_is_flagged_low_confidence() {
    let router = ScriptedRouter::new([
        Ok(RouterVerdict::Decision(RoutingDecision::Continue)),
        Ok(RouterVerdict::Decision(RoutingDecision::Finish)),
    ]);
    let worker = ScriptedWorker::new([Ok(Message::worker_answer("  "))]);

    let outcome = engine(router, worker).run("Average BMI?", RunOptions::new(25, "req-9")).await;

    assert_eq!(outcome.status, EngineStatus::Completed);
    assert_eq!(outcome.final_answer, FALLBACK_ANSWER);
    assert!(outcome.trace.render()[1].ends_with("[low-confidence]"));
}

/// Answers router prompts with the next queued decision and worker prompts
/// with the next queued completion.
struct ModeAwareLlm {
    routes: Mutex<VecDeque<&'static str>>,
    worker: Mutex<VecDeque<Completion>>,
    calls: AtomicUsize,
}

#[async_trait]
impl LlmClient for ModeAwareLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match request.mode {
            OutputMode::Structured { .. } => {
                let route = self.routes.lock().expect("routes lock").pop_front().unwrap_or("FINISH");
                Ok(Completion::text(format!(r#"{{"next_actor": "{route}"}}"#)))
            }
            OutputMode::ToolCalling { .. } => Ok(self
                .worker
                .lock()
                .expect("worker lock")
                .pop_front()
                .unwrap_or_else(|| Completion::text("No further analysis."))),
        }
    }
}

fn mode_aware(routes: &[&'static str], worker: Vec<Completion>) -> Arc<ModeAwareLlm> {
    Arc::new(ModeAwareLlm {
        routes: Mutex::new(routes.iter().copied().collect()),
        worker: Mutex::new(worker.into_iter().collect()),
        calls: AtomicUsize::new(0),
    })
}

#[tokio::test]
async fn runtime_answers_through_the_model_backed_actors() {
    let llm = mode_aware(
        &["Data_Analyst", "FINISH"],
        vec![
            Completion {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    id: "call-7".to_string(),
                    name: "analysis".to_string(),
                    arguments: serde_json::json!({ "code": SMOKERS_WITH_CKD }).to_string(),
                }],
            },
            Completion::text("2 smokers have chronic kidney disease."),
        ],
    );
    let audit = Arc::new(InMemoryAuditSink::default());
    let runtime =
        build_runtime_with_llm(&AppConfig::default(), fixture(), llm, audit).expect("runtime");

    let response = runtime.handle_query("How many smokers have chronic kidney disease?").await;

    assert_eq!(response.status, ResponseStatus::Completed);
    assert_eq!(response.final_answer, "2 smokers have chronic kidney disease.");
    assert_eq!(response.trace.len(), 5);
    assert_eq!(response.trace[2], "Tool: 2");
    assert!(response.reason_code.is_none());
}

#[tokio::test]
async fn rejected_queries_never_reach_the_model() {
    let llm = mode_aware(&[], Vec::new());
    let audit = Arc::new(InMemoryAuditSink::default());
    let runtime = build_runtime_with_llm(&AppConfig::default(), fixture(), llm.clone(), audit.clone())
        .expect("runtime");

    let response = runtime.handle_query("Write a poem about blood pressure").await;

    assert_eq!(response.status, ResponseStatus::Rejected);
    assert_eq!(response.reason_code.as_deref(), Some("scope"));
    assert!(response.trace.is_empty());
    assert!(response.final_answer.contains("health data analysis tool"));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    assert_eq!(audit.events_of_type("guardrail.rejected").len(), 1);
}

#[tokio::test]
async fn router_decision_depends_only_on_the_conversation() {
    let llm = mode_aware(&["Data_Analyst", "Data_Analyst"], Vec::new());
    let router = LlmRouter::new(llm, 2);
    let messages = vec![Message::user("Average BMI of smokers?")];

    let first = router.decide(&messages).await.expect("first decision");
    let second = router.decide(&messages).await.expect("second decision");

    assert_eq!(first, second);
    assert_eq!(first, RouterVerdict::Decision(RoutingDecision::Continue));
    assert_eq!(messages.len(), 1);
}
