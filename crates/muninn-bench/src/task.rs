//! The task shape produced by every generator and consumed by the runner.

use serde::{Deserialize, Serialize};

/// How the scorer should compare an executor's answer against the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    Exact,
    Numeric,
    F1,
    Contains,
    /// Scored by a caller-supplied scorer rather than `score()`'s builtin
    /// rules; none of the builtin generators produce it. `score()` falls
    /// back to exact-match semantics when no custom scorer is wired in.
    Custom,
}

/// Which generator produced a task; also the round-robin axis for `Multi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    Counting,
    Needle,
    Pairing,
    Aggregation,
}

impl GeneratorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratorKind::Counting => "counting",
            GeneratorKind::Needle => "needle",
            GeneratorKind::Pairing => "pairing",
            GeneratorKind::Aggregation => "aggregation",
        }
    }
}

/// A single synthetic long-context task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub generator: GeneratorKind,
    pub prompt: String,
    pub expected_answer: String,
    pub answer_type: AnswerType,
    /// Approximate token count of `prompt`, whitespace-split.
    pub context_tokens: usize,
    /// 1 (trivial) to 10 (very complex), mirrors `lats::capability::Requirements`.
    pub complexity: u8,
    /// Generator-specific facts (e.g. the embedded numbers), useful for
    /// diagnostics and for verifying `numeric` answers independently.
    pub metadata: serde_json::Value,
}

impl Task {
    pub fn token_bucket(&self) -> ContextBucket {
        ContextBucket::from_tokens(self.context_tokens)
    }
}

/// Context-length bucket used by both the runner's summary and the
/// context-rot analyser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContextBucket {
    Under4k,
    Under16k,
    Under64k,
    Under128k,
    Over128k,
}

impl ContextBucket {
    pub fn from_tokens(tokens: usize) -> Self {
        match tokens {
            0..=4_000 => ContextBucket::Under4k,
            4_001..=16_000 => ContextBucket::Under16k,
            16_001..=64_000 => ContextBucket::Under64k,
            64_001..=128_000 => ContextBucket::Under128k,
            _ => ContextBucket::Over128k,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ContextBucket::Under4k => "0-4K",
            ContextBucket::Under16k => "4-16K",
            ContextBucket::Under64k => "16-64K",
            ContextBucket::Under128k => "64-128K",
            ContextBucket::Over128k => "128K+",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_boundaries_are_inclusive_upper() {
        assert_eq!(ContextBucket::from_tokens(4_000), ContextBucket::Under4k);
        assert_eq!(ContextBucket::from_tokens(4_001), ContextBucket::Under16k);
        assert_eq!(ContextBucket::from_tokens(128_000), ContextBucket::Under128k);
        assert_eq!(ContextBucket::from_tokens(128_001), ContextBucket::Over128k);
    }
}
