//! Executes a suite of tasks against a pluggable [`Executor`] and aggregates
//! a [`Report`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use muninn_repl::CancellationToken;
use serde::Serialize;

use crate::scorer::{score, CustomScorer};
use crate::task::{AnswerType, ContextBucket, Task};

/// What an executor produced for one task.
#[derive(Debug, Clone)]
pub struct ExecutorOutput {
    pub answer: String,
    pub tokens: u64,
    pub iterations: u32,
}

/// The thing under benchmark: anything that can answer a task's prompt.
/// Implemented by adapters over `muninn-lats::LatsController`, a raw LLM
/// call, or a scripted stub in tests.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, task: &Task, cancel: CancellationToken) -> Result<ExecutorOutput, String>;
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub per_task_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            per_task_timeout: Duration::from_secs(30),
        }
    }
}

/// One task's outcome.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task_id: String,
    pub generator: String,
    pub context_tokens: usize,
    pub complexity: u8,
    pub score: f64,
    pub correct: bool,
    pub tokens: u64,
    pub iterations: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BucketStats {
    pub task_count: usize,
    pub correct_count: usize,
    pub accuracy: f64,
    pub mean_score: f64,
}

fn fold_bucket_stats(results: &[&TaskResult]) -> BucketStats {
    let task_count = results.len();
    if task_count == 0 {
        return BucketStats::default();
    }
    let correct_count = results.iter().filter(|r| r.correct).count();
    let mean_score = results.iter().map(|r| r.score).sum::<f64>() / task_count as f64;
    BucketStats {
        task_count,
        correct_count,
        accuracy: correct_count as f64 / task_count as f64,
        mean_score,
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub task_count: usize,
    pub correct_count: usize,
    pub accuracy: f64,
    pub mean_score: f64,
    pub total_tokens: u64,
    pub mean_iterations: f64,
    pub mean_duration_ms: f64,
    pub error_count: usize,
    pub per_complexity: HashMap<u8, BucketStats>,
    pub per_context_bucket: HashMap<String, BucketStats>,
}

impl Summary {
    fn compute(results: &[TaskResult], bucket_of: &HashMap<String, ContextBucket>) -> Self {
        let task_count = results.len();
        if task_count == 0 {
            return Self::default();
        }

        let correct_count = results.iter().filter(|r| r.correct).count();
        let mean_score = results.iter().map(|r| r.score).sum::<f64>() / task_count as f64;
        let total_tokens: u64 = results.iter().map(|r| r.tokens).sum();
        let mean_iterations =
            results.iter().map(|r| r.iterations as f64).sum::<f64>() / task_count as f64;
        let mean_duration_ms =
            results.iter().map(|r| r.duration_ms as f64).sum::<f64>() / task_count as f64;
        let error_count = results.iter().filter(|r| r.error.is_some()).count();

        let mut per_complexity: HashMap<u8, Vec<&TaskResult>> = HashMap::new();
        let mut per_bucket: HashMap<ContextBucket, Vec<&TaskResult>> = HashMap::new();
        for r in results {
            per_complexity.entry(r.complexity).or_default().push(r);
            let bucket = bucket_of.get(&r.task_id).copied().unwrap_or(ContextBucket::Under4k);
            per_bucket.entry(bucket).or_default().push(r);
        }

        Summary {
            task_count,
            correct_count,
            accuracy: correct_count as f64 / task_count as f64,
            mean_score,
            total_tokens,
            mean_iterations,
            mean_duration_ms,
            error_count,
            per_complexity: per_complexity
                .into_iter()
                .map(|(k, v)| (k, fold_bucket_stats(&v)))
                .collect(),
            per_context_bucket: per_bucket
                .into_iter()
                .map(|(k, v)| (k.label().to_string(), fold_bucket_stats(&v)))
                .collect(),
        }
    }
}

/// The outcome of running a whole suite, possibly cut short by cancellation.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub results: Vec<TaskResult>,
    pub summary: Summary,
    pub total_duration_ms: u64,
    pub cancelled: bool,
}

pub struct Runner {
    config: RunnerConfig,
    custom_scorer: Option<Arc<CustomScorer>>,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config, custom_scorer: None }
    }

    /// Scores `AnswerType::Custom` tasks with `scorer` instead of `score()`'s
    /// exact-match fallback. Tasks of any other answer type are unaffected.
    pub fn with_custom_scorer(mut self, scorer: Arc<CustomScorer>) -> Self {
        self.custom_scorer = Some(scorer);
        self
    }

    /// Runs every task in `tasks` against `executor`, scoring as it goes.
    /// Stops early (returning a partial report with `cancelled = true`) if
    /// `cancel` fires between tasks.
    pub async fn run_suite(
        &self,
        tasks: &[Task],
        executor: &dyn Executor,
        cancel: CancellationToken,
    ) -> Report {
        let suite_start = Instant::now();
        let mut results = Vec::with_capacity(tasks.len());
        let mut bucket_of = HashMap::new();
        let mut cancelled = false;

        for task in tasks {
            bucket_of.insert(task.id.clone(), task.token_bucket());

            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let task_start = Instant::now();
            let outcome =
                tokio::time::timeout(self.config.per_task_timeout, executor.run(task, cancel.clone())).await;

            let result = match outcome {
                Ok(Ok(output)) => {
                    let scored = match (task.answer_type, &self.custom_scorer) {
                        (AnswerType::Custom, Some(custom)) => custom(&output.answer, &task.expected_answer),
                        _ => score(task.answer_type, &output.answer, &task.expected_answer),
                    };
                    TaskResult {
                        task_id: task.id.clone(),
                        generator: task.generator.as_str().to_string(),
                        context_tokens: task.context_tokens,
                        complexity: task.complexity,
                        score: scored.score,
                        correct: scored.correct,
                        tokens: output.tokens,
                        iterations: output.iterations,
                        duration_ms: task_start.elapsed().as_millis() as u64,
                        error: None,
                    }
                }
                Ok(Err(e)) => TaskResult {
                    task_id: task.id.clone(),
                    generator: task.generator.as_str().to_string(),
                    context_tokens: task.context_tokens,
                    complexity: task.complexity,
                    score: 0.0,
                    correct: false,
                    tokens: 0,
                    iterations: 0,
                    duration_ms: task_start.elapsed().as_millis() as u64,
                    error: Some(e),
                },
                Err(_) => TaskResult {
                    task_id: task.id.clone(),
                    generator: task.generator.as_str().to_string(),
                    context_tokens: task.context_tokens,
                    complexity: task.complexity,
                    score: 0.0,
                    correct: false,
                    tokens: 0,
                    iterations: 0,
                    duration_ms: task_start.elapsed().as_millis() as u64,
                    error: Some(format!("timed out after {:?}", self.config.per_task_timeout)),
                },
            };
            results.push(result);
        }

        let summary = Summary::compute(&results, &bucket_of);
        Report {
            results,
            summary,
            total_duration_ms: suite_start.elapsed().as_millis() as u64,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{CountingGenerator, TaskGenerator};
    use crate::task::AnswerType;

    struct EchoExecutor;

    #[async_trait]
    impl Executor for EchoExecutor {
        async fn run(&self, task: &Task, _cancel: CancellationToken) -> Result<ExecutorOutput, String> {
            Ok(ExecutorOutput {
                answer: task.expected_answer.clone(),
                tokens: 10,
                iterations: 1,
            })
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl Executor for FailingExecutor {
        async fn run(&self, _task: &Task, _cancel: CancellationToken) -> Result<ExecutorOutput, String> {
            Err("boom".to_string())
        }
    }

    fn sample_tasks(n: usize) -> Vec<Task> {
        let g = CountingGenerator;
        (0..n).map(|i| g.generate(i as u64, 200)).collect()
    }

    #[tokio::test]
    async fn perfect_executor_scores_full_accuracy() {
        let runner = Runner::new(RunnerConfig::default());
        let tasks = sample_tasks(3);
        let report = runner.run_suite(&tasks, &EchoExecutor, CancellationToken::new()).await;
        assert_eq!(report.summary.task_count, 3);
        assert_eq!(report.summary.accuracy, 1.0);
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn executor_errors_are_recorded_not_fatal() {
        let runner = Runner::new(RunnerConfig::default());
        let tasks = sample_tasks(2);
        let report = runner.run_suite(&tasks, &FailingExecutor, CancellationToken::new()).await;
        assert_eq!(report.summary.error_count, 2);
        assert_eq!(report.summary.accuracy, 0.0);
    }

    #[tokio::test]
    async fn pre_cancelled_token_yields_empty_partial_report() {
        let runner = Runner::new(RunnerConfig::default());
        let tasks = sample_tasks(5);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = runner.run_suite(&tasks, &EchoExecutor, cancel).await;
        assert!(report.cancelled);
        assert_eq!(report.results.len(), 0);
    }

    #[test]
    fn answer_type_default_path_sanity() {
        assert_eq!(AnswerType::Exact, AnswerType::Exact);
    }

    struct AlwaysWrongExecutor;

    #[async_trait]
    impl Executor for AlwaysWrongExecutor {
        async fn run(&self, _task: &Task, _cancel: CancellationToken) -> Result<ExecutorOutput, String> {
            Ok(ExecutorOutput { answer: "nope".to_string(), tokens: 1, iterations: 1 })
        }
    }

    #[tokio::test]
    async fn custom_scorer_overrides_exact_match_fallback_for_custom_tasks() {
        let mut tasks = sample_tasks(1);
        tasks[0].answer_type = AnswerType::Custom;

        let runner = Runner::new(RunnerConfig::default())
            .with_custom_scorer(Arc::new(|_actual: &str, _expected: &str| crate::scorer::ScoreResult {
                score: 1.0,
                correct: true,
            }));
        let report = runner.run_suite(&tasks, &AlwaysWrongExecutor, CancellationToken::new()).await;
        assert_eq!(report.summary.accuracy, 1.0, "custom scorer always marks correct regardless of answer text");
    }
}
