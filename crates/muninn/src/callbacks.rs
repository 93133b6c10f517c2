//! Host-side implementations of the REPL's re-entrant callback traits.
//!
//! `HostCallbackHandler` re-enters the configured `LlmOracle` for
//! `llm_call`/`llm_batch`; `HostMemoryHandler` re-enters the session-tier
//! `NodeStore` for `memory_*`. Both turn subsystem errors into the string
//! `error` field the wire protocol carries on a callback response, per
//! never a host-level error out of `Execute`.

use std::sync::Arc;

use async_trait::async_trait;
use muninn_lats::LlmOracle;
use muninn_memory::{NodeStore, Tier};
use muninn_repl::{CallbackHandler, MemoryAddExperienceParams, MemoryHandler, ReplError, Result};

pub struct HostCallbackHandler {
    oracle: Arc<dyn LlmOracle>,
}

impl HostCallbackHandler {
    pub fn new(oracle: Arc<dyn LlmOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl CallbackHandler for HostCallbackHandler {
    async fn llm_call(&self, prompt: &str, context: &str, _model: Option<&str>) -> Result<String> {
        let full_prompt = if context.is_empty() {
            prompt.to_string()
        } else {
            format!("{context}\n\n{prompt}")
        };
        let (text, _tokens) = self
            .oracle
            .complete(&full_prompt, 1024)
            .await
            .map_err(|e| ReplError::Internal(e.to_string()))?;
        Ok(text)
    }

    async fn llm_batch(
        &self,
        prompts: &[String],
        contexts: &[String],
        model: Option<&str>,
    ) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(prompts.len());
        for (i, prompt) in prompts.iter().enumerate() {
            let context = contexts.get(i).map(String::as_str).unwrap_or("");
            out.push(self.llm_call(prompt, context, model).await?);
        }
        Ok(out)
    }
}

pub struct HostMemoryHandler {
    store: Arc<dyn NodeStore>,
}

impl HostMemoryHandler {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MemoryHandler for HostMemoryHandler {
    async fn query(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let results = self
            .store
            .search(Tier::Session, query, limit)
            .map_err(|e| ReplError::Internal(e.to_string()))?;
        results
            .into_iter()
            .map(|(node, score)| {
                serde_json::to_string(&serde_json::json!({ "node": node, "score": score }))
                    .map_err(ReplError::from)
            })
            .collect()
    }

    async fn add_fact(&self, content: &str, confidence: f32) -> Result<String> {
        let (node, _warning) = self
            .store
            .add_fact(Tier::Session, content, Some(confidence))
            .map_err(|e| ReplError::Internal(e.to_string()))?;
        Ok(node.id)
    }

    async fn add_experience(&self, params: MemoryAddExperienceParams) -> Result<String> {
        let details = muninn_memory::ExperienceDetails {
            task: params.task,
            approach: params.approach,
            files_modified: params.files_modified,
            blockers: params.blockers,
            insights: params.insights,
            related_decisions: params.related_decisions,
            duration_secs: params.duration_secs,
        };
        let (node, _warning) = self
            .store
            .add_experience_detailed(Tier::Session, &params.content, &params.outcome, params.success, details)
            .map_err(|e| ReplError::Internal(e.to_string()))?;
        Ok(node.id)
    }

    async fn get_context(&self, limit: usize) -> Result<Vec<String>> {
        let nodes = self
            .store
            .get_context(Tier::Session, limit)
            .map_err(|e| ReplError::Internal(e.to_string()))?;
        nodes
            .into_iter()
            .map(|node| serde_json::to_string(&node).map_err(ReplError::from))
            .collect()
    }

    async fn relate(&self, label: &str, subject_id: &str, object_id: &str) -> Result<String> {
        self.store
            .relate(label, subject_id, object_id)
            .map_err(|e| ReplError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muninn_memory::GraphStore;

    struct FixedOracle;

    #[async_trait]
    impl LlmOracle for FixedOracle {
        async fn complete(&self, prompt: &str, _max_tokens: u32) -> muninn_lats::Result<(String, u64)> {
            Ok((format!("echo: {prompt}"), 5))
        }
    }

    #[tokio::test]
    async fn llm_call_prefixes_context() {
        let handler = HostCallbackHandler::new(Arc::new(FixedOracle));
        let out = handler.llm_call("question", "background", None).await.unwrap();
        assert_eq!(out, "echo: background\n\nquestion");
    }

    #[tokio::test]
    async fn llm_batch_preserves_order() {
        let handler = HostCallbackHandler::new(Arc::new(FixedOracle));
        let prompts = vec!["a".to_string(), "b".to_string()];
        let contexts = vec!["".to_string(), "".to_string()];
        let out = handler.llm_batch(&prompts, &contexts, None).await.unwrap();
        assert_eq!(out, vec!["echo: a".to_string(), "echo: b".to_string()]);
    }

    #[tokio::test]
    async fn memory_add_fact_then_query_round_trips() {
        let store: Arc<dyn NodeStore> = Arc::new(GraphStore::open_in_memory().unwrap());
        let handler = HostMemoryHandler::new(store);
        let id = handler.add_fact("the sky is blue", 0.9).await.unwrap();
        assert!(!id.is_empty());
        let results = handler.query("sky", 5).await.unwrap();
        assert!(!results.is_empty());
    }
}
