//! Cross-crate integration tests: REPL, LATS, memory, and bench working
//! together against a real `python3` child process.

use std::sync::Arc;

use async_trait::async_trait;
use muninn_bench::{generate_suite, CountingGenerator, Executor, ExecutorOutput, Runner, RunnerConfig};
use muninn_lats::{
    Action, Expander, HeuristicValuator, LatsConfig, LatsController, LlmExpander, LlmOracle,
    Observation, RealSimulator, ReplExecuteTool, Result as LatsResult, Simulator, Tool, ToolRegistry,
    ToolResult, TerminationReason,
};
use muninn_memory::{GraphStore, NodeStore, Tier};
use muninn_repl::{CallbackHandler, CancellationToken, MemoryAddExperienceParams, MemoryHandler, ReplError,
    ReplSupervisor, Result as ReplResult, SandboxConfig};
use muninn_resilience::{BreakerConfig, BreakerRegistry};

fn test_sandbox() -> SandboxConfig {
    SandboxConfig::new().without_sandbox().with_timeout(10)
}

/// Routes `llm_call`/`llm_batch` through a fixed string, `memory_*` through a
/// real in-memory `GraphStore`. Mirrors how the CLI wires the REPL to its
/// subsystems, without depending on the binary crate.
struct FixedOracle(String);

#[async_trait]
impl LlmOracle for FixedOracle {
    async fn complete(&self, _prompt: &str, _max_tokens: u32) -> LatsResult<(String, u64)> {
        Ok((self.0.clone(), self.0.len() as u64))
    }
}

struct TestCallbackHandler {
    reply: String,
}

#[async_trait]
impl CallbackHandler for TestCallbackHandler {
    async fn llm_call(&self, _prompt: &str, _context: &str, _model: Option<&str>) -> ReplResult<String> {
        Ok(self.reply.clone())
    }

    async fn llm_batch(
        &self,
        prompts: &[String],
        _contexts: &[String],
        _model: Option<&str>,
    ) -> ReplResult<Vec<String>> {
        Ok(prompts.iter().map(|_| self.reply.clone()).collect())
    }
}

struct TestMemoryHandler {
    store: Arc<dyn NodeStore>,
}

#[async_trait]
impl MemoryHandler for TestMemoryHandler {
    async fn query(&self, query: &str, limit: usize) -> ReplResult<Vec<String>> {
        let results = self
            .store
            .search(Tier::Session, query, limit)
            .map_err(|e| ReplError::Internal(e.to_string()))?;
        Ok(results.into_iter().map(|(node, _score)| node.content).collect())
    }

    async fn add_fact(&self, content: &str, confidence: f32) -> ReplResult<String> {
        let (node, _warning) = self
            .store
            .add_fact(Tier::Session, content, Some(confidence))
            .map_err(|e| ReplError::Internal(e.to_string()))?;
        Ok(node.id)
    }

    async fn add_experience(&self, params: MemoryAddExperienceParams) -> ReplResult<String> {
        let (node, _warning) = self
            .store
            .add_experience(Tier::Session, &params.content, &params.outcome, params.success)
            .map_err(|e| ReplError::Internal(e.to_string()))?;
        Ok(node.id)
    }

    async fn get_context(&self, limit: usize) -> ReplResult<Vec<String>> {
        let nodes = self
            .store
            .get_context(Tier::Session, limit)
            .map_err(|e| ReplError::Internal(e.to_string()))?;
        Ok(nodes.into_iter().map(|n| n.content).collect())
    }

    async fn relate(&self, label: &str, subject_id: &str, object_id: &str) -> ReplResult<String> {
        self.store
            .relate(label, subject_id, object_id)
            .map_err(|e| ReplError::Internal(e.to_string()))
    }
}

/// A REPL `memory_add_fact` callback lands in the same `GraphStore` a
/// subsequent `memory_query` call reads from, round-tripping through a real
/// python3 child and the JSON-framed callback protocol.
#[tokio::test]
async fn repl_memory_callbacks_round_trip_through_graph_store() {
    let store: Arc<dyn NodeStore> = Arc::new(GraphStore::open_in_memory().unwrap());

    let supervisor = ReplSupervisor::new(test_sandbox());
    supervisor.set_callback_handler(Arc::new(TestCallbackHandler { reply: "unused".to_string() }));
    supervisor.set_memory_handler(Arc::new(TestMemoryHandler { store: store.clone() }));
    supervisor.start(CancellationToken::new()).await.expect("python3 must be on PATH");

    let outcome = supervisor
        .execute(CancellationToken::new(), "memory_add_fact('the sky is blue', confidence=0.9)\n'done'")
        .await
        .expect("execute should succeed");
    assert!(outcome.error_repr.is_none(), "unexpected error: {:?}", outcome.error_repr);

    let results = store.search(Tier::Session, "sky", 5).unwrap();
    assert!(!results.is_empty(), "fact added via the REPL callback should be searchable from the host");

    let query_outcome = supervisor
        .execute(CancellationToken::new(), "results = memory_query('sky', limit=5)\nlen(results)")
        .await
        .expect("execute should succeed");
    assert_ne!(query_outcome.return_repr.as_deref(), Some("0"));

    supervisor.stop().await.expect("stop should succeed");
}

/// A full LATS search, with the sandboxed REPL itself registered as the
/// `execute_python` tool, converges on a terminal answer under a modest
/// iteration budget.
#[tokio::test]
async fn lats_solve_reaches_a_terminal_answer_using_the_repl_tool() {
    let supervisor = ReplSupervisor::new(test_sandbox());
    supervisor.start(CancellationToken::new()).await.expect("python3 must be on PATH");

    let mut registry = ToolRegistry::new();
    registry.register(ReplExecuteTool::new(supervisor.clone()));
    registry.register(FinalAnswerTestTool);
    let registry = Arc::new(registry);

    let oracle: Arc<dyn LlmOracle> = Arc::new(FixedOracle(
        "[Action 1] Tool: final_answer Input: {\"text\": \"42\"} Reasoning: computed".to_string(),
    ));
    let expander: Arc<dyn Expander> = Arc::new(LlmExpander::new(oracle, registry.clone(), 2));
    let valuator = Arc::new(HeuristicValuator::default());
    let simulator: Arc<dyn Simulator> = Arc::new(RealSimulator::new(registry, valuator, 4));

    let config = LatsConfig::new().with_max_iterations(10);
    let controller = LatsController::new(config);
    let solution = controller
        .solve("what is the answer?", expander, simulator, CancellationToken::new())
        .await;

    assert_eq!(solution.termination_reason, TerminationReason::SolutionFound);
    assert!(solution.final_answer.contains("42"));

    supervisor.stop().await.expect("stop should succeed");
}

struct FinalAnswerTestTool;

#[async_trait]
impl Tool for FinalAnswerTestTool {
    fn name(&self) -> &str {
        "final_answer"
    }

    fn description(&self) -> &str {
        "Declare the final answer."
    }

    async fn execute(&self, input: serde_json::Value) -> LatsResult<ToolResult> {
        let text = input.get("text").and_then(|v| v.as_str()).unwrap_or_default();
        Ok(ToolResult::ok(format!("final_answer: {text}"), 0))
    }
}

/// An `Executor` that drives a fresh `LatsController` per task feeds the
/// benchmark runner exactly as the CLI's `bench` subcommand does, and the
/// runner's summary reflects the controller's answers.
struct ScriptedLatsExecutor;

#[async_trait]
impl Executor for ScriptedLatsExecutor {
    async fn run(
        &self,
        task: &muninn_bench::Task,
        cancel: CancellationToken,
    ) -> std::result::Result<ExecutorOutput, String> {
        let mut registry = ToolRegistry::new();
        registry.register(FinalAnswerTestTool);
        let registry = Arc::new(registry);

        let oracle: Arc<dyn LlmOracle> = Arc::new(FixedOracle(format!(
            "[Action 1] Tool: final_answer Input: {{\"text\": \"{}\"}} Reasoning: direct",
            task.expected_answer
        )));
        let expander: Arc<dyn Expander> = Arc::new(LlmExpander::new(oracle, registry.clone(), 1));
        let valuator = Arc::new(HeuristicValuator::default());
        let simulator: Arc<dyn Simulator> = Arc::new(RealSimulator::new(registry, valuator, 2));

        let controller = LatsController::new(LatsConfig::new().with_max_iterations(5));
        let solution = controller.solve(&task.prompt, expander, simulator, cancel).await;
        Ok(ExecutorOutput {
            answer: solution.final_answer,
            tokens: solution.total_tokens,
            iterations: solution.iterations,
        })
    }
}

#[tokio::test]
async fn bench_runner_scores_a_lats_backed_executor() {
    let tasks = generate_suite(&CountingGenerator, 7, 300, 4);
    let runner = Runner::new(RunnerConfig::default());
    let report = runner.run_suite(&tasks, &ScriptedLatsExecutor, CancellationToken::new()).await;

    assert_eq!(report.summary.task_count, 4);
    assert_eq!(report.summary.accuracy, 1.0, "scripted executor echoes the expected answer verbatim");
    assert!(!report.cancelled);
}

/// A circuit breaker that trips after repeated simulated oracle failures
/// stops letting the expander proceed until its recovery timeout elapses,
/// independent of which subsystem it's guarding.
#[tokio::test]
async fn circuit_breaker_trips_and_recovers_around_a_failing_dependency() {
    let registry = BreakerRegistry::new();
    registry.set_default("oracle", BreakerConfig::new(2, std::time::Duration::from_millis(50), 1));
    let breaker = registry.get_or_create("oracle");

    assert!(breaker.allow().is_ok());
    breaker.record_failure();
    breaker.record_failure();

    assert!(breaker.allow().is_err(), "breaker should be open after crossing the failure threshold");

    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    assert!(breaker.allow().is_ok(), "breaker should allow a trial call once the recovery timeout elapses");
    breaker.record_success();
    assert!(breaker.allow().is_ok());
}

// Keep Action/Observation reachable for downstream trace-shape assertions
// even though this file's scenarios only assert on `Solution`.
#[allow(dead_code)]
fn _unused_type_anchor(_: Action, _: Observation) {}
