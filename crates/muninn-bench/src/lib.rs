//! Deterministic synthetic long-context benchmark harness.
//!
//! Generates tasks at configurable context sizes ([`generators`]), executes
//! them against a pluggable [`runner::Executor`], scores the answers
//! ([`scorer`]), and aggregates both a [`runner::Report`] and a
//! [`context_rot::ContextRotReport`] trendline.

pub mod context_rot;
pub mod error;
pub mod generators;
pub mod runner;
pub mod scorer;
pub mod task;

pub use context_rot::{ContextBucketStats, ContextRotAnalyzer, ContextRotReport};
pub use error::{BenchError, Result};
pub use generators::{
    generate_suite, AggregationGenerator, CountingGenerator, MultiGenerator, NeedleGenerator,
    PairingGenerator, TaskGenerator,
};
pub use runner::{BucketStats, Executor, ExecutorOutput, Report, Runner, RunnerConfig, Summary, TaskResult};
pub use scorer::{score, CustomScorer, ScoreResult};
pub use task::{AnswerType, ContextBucket, GeneratorKind, Task};
