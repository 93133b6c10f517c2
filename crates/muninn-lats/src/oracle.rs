//! The minimal LLM oracle interface the orchestrator depends on.
//!
//! Any collaborator satisfying `Complete` can drive expansion/valuation;
//! the orchestrator treats it as an opaque completion function and makes no
//! assumptions about prompt format or model identity.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait LlmOracle: Send + Sync {
    /// Complete `prompt`, returning the completion text and the total token
    /// count the call consumed (prompt + completion).
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<(String, u64)>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed reply for every call, recording how many times it was
    /// invoked.
    pub struct FixedOracle {
        reply: String,
        tokens: u64,
        calls: AtomicUsize,
    }

    impl FixedOracle {
        pub fn new(reply: impl Into<String>, tokens: u64) -> Self {
            Self {
                reply: reply.into(),
                tokens,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmOracle for FixedOracle {
        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<(String, u64)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((self.reply.clone(), self.tokens))
        }
    }
}
